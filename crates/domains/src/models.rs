//! # Domain Models
//!
//! These structs represent the core entities of Communiverse.
//! We use UUID v7 for time-ordered, globally unique identification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// Names of the seeded role table. Lookups always go through the
/// `RoleRepository`; comparisons always go through [`Role::level`].
pub mod role_names {
    pub const USER: &str = "user";
    pub const MEMBER: &str = "member";
    pub const MODERATOR: &str = "moderator";
    pub const ADMIN: &str = "admin";
}

/// A global or community-scoped role. Privilege is the `level`, never the name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub level: i32,
}

impl Role {
    /// Synthetic role of a viewer holding no membership in a community.
    pub fn visitor() -> Self {
        Self {
            id: -1,
            name: "visitor".to_string(),
            level: 0,
        }
    }

    pub fn is_visitor(&self) -> bool {
        self.id < 0
    }

    pub fn satisfies(&self, required: &Role) -> bool {
        self.level >= required.level
    }
}

// ── Users ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub email: String,
    pub bio: Option<String>,
    pub avatar_id: Option<String>,
    /// Platform-wide role (e.g. "user", "admin")
    pub role: Role,
    #[serde(skip)]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn overview(&self) -> UserOverview {
        UserOverview {
            id: self.id,
            name: self.name.clone(),
            username: self.username.clone(),
            avatar_id: self.avatar_id.clone(),
        }
    }

    pub fn public_profile(&self) -> PublicProfile {
        PublicProfile {
            id: self.id,
            name: self.name.clone(),
            username: self.username.clone(),
            bio: self.bio.clone(),
            avatar_id: self.avatar_id.clone(),
            created_at: self.created_at,
        }
    }
}

/// What anyone may see of an account: no email, no role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicProfile {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub bio: Option<String>,
    pub avatar_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The author block embedded in posts and comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserOverview {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub avatar_id: Option<String>,
}

/// A user together with the stored password hash. Never serialized.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    Invitation,
    PasswordReset,
}

/// A one-time token awaiting consumption. Only the hash is ever stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingToken {
    pub user_id: Uuid,
    pub purpose: TokenPurpose,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

// ── Communities ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Community {
    pub id: Uuid,
    pub name: String,
    /// The URL slug, unique among communities
    pub slug: String,
    pub description: String,
    pub thumbnail_id: Option<String>,
    /// Creator; immutable after creation
    pub creator_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Community {
    pub fn overview(&self) -> CommunityOverview {
        CommunityOverview {
            id: self.id,
            name: self.name.clone(),
            slug: self.slug.clone(),
            thumbnail_id: self.thumbnail_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityOverview {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub thumbnail_id: Option<String>,
}

/// A community as seen by one viewer, used by listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunitySummary {
    #[serde(flatten)]
    pub community: Community,
    /// The viewer's membership role, or the visitor role
    pub viewer_role: Role,
    pub num_members: i64,
}

/// Full community page for one viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityDetails {
    #[serde(flatten)]
    pub community: Community,
    pub creator: UserOverview,
    pub viewer_role: Role,
    pub num_members: i64,
    pub num_posts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: Uuid,
    pub community_id: Uuid,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

// ── Posts ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    /// The URL slug, unique among posts
    pub slug: String,
    pub tags: Vec<String>,
    pub community_id: Uuid,
    /// Author; immutable after creation
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Aggregates computed in the same pass as the post itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostStats {
    pub score: i64,
    pub viewer_vote: i16,
    pub num_comments: i64,
}

/// One feed item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostSummary {
    #[serde(flatten)]
    pub post: Post,
    pub community: CommunityOverview,
    pub author: UserOverview,
    #[serde(flatten)]
    pub stats: PostStats,
}

/// The community block of a single post page, including the viewer's role in it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostCommunity {
    #[serde(flatten)]
    pub overview: CommunityOverview,
    pub viewer_role: Role,
    pub num_members: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostDetails {
    #[serde(flatten)]
    pub post: Post,
    pub community: PostCommunity,
    pub author: UserOverview,
    #[serde(flatten)]
    pub stats: PostStats,
}

// ── Comments ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    /// `None` for top-level comments
    pub parent_id: Option<Uuid>,
    pub content: String,
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A comment annotated with its aggregate score and the viewer's vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: UserOverview,
    pub score: i64,
    pub viewer_vote: i16,
}

/// A comment with its nested replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub view: CommentView,
    pub replies: Vec<CommentNode>,
}

/// What authorization needs to know about a comment: the comment itself,
/// the community owning its post, and the viewer's role in that community.
#[derive(Debug, Clone)]
pub struct CommentContext {
    pub comment: Comment,
    pub community_id: Uuid,
    pub viewer_role: Role,
}

// ── Votes ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum VoteTarget {
    Post(Uuid),
    Comment(Uuid),
}

impl VoteTarget {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Post(id) | Self::Comment(id) => *id,
        }
    }
}

/// A signed vote constrained to {-1, 0, 1}. Zero is a retracted vote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct VoteValue(i16);

impl VoteValue {
    pub const DOWN: Self = Self(-1);
    pub const NEUTRAL: Self = Self(0);
    pub const UP: Self = Self(1);

    pub fn get(self) -> i16 {
        self.0
    }
}

impl TryFrom<i64> for VoteValue {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1..=1 => Ok(Self(value as i16)),
            other => Err(DomainError::Validation(format!(
                "vote value must be -1, 0 or 1, got {other}"
            ))),
        }
    }
}

impl From<VoteValue> for i64 {
    fn from(value: VoteValue) -> Self {
        i64::from(value.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visitor_is_below_every_seeded_role() {
        let visitor = Role::visitor();
        let member = Role {
            id: 2,
            name: role_names::MEMBER.into(),
            level: 10,
        };
        assert!(visitor.is_visitor());
        assert!(!visitor.satisfies(&member));
        assert!(member.satisfies(&visitor));
    }

    #[test]
    fn vote_value_rejects_out_of_range() {
        assert_eq!(VoteValue::try_from(1).unwrap(), VoteValue::UP);
        assert_eq!(VoteValue::try_from(-1).unwrap(), VoteValue::DOWN);
        assert!(matches!(VoteValue::try_from(2), Err(DomainError::Validation(_))));
        assert!(serde_json::from_str::<VoteValue>("-2").is_err());
        assert_eq!(serde_json::from_str::<VoteValue>("0").unwrap(), VoteValue::NEUTRAL);
    }
}
