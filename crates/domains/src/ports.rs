//! # Ports
//!
//! Any adapter must implement these traits to be wired into the binary.
//! Repositories return `Ok(None)` for a missing row on lookups and
//! `Err(DomainError::NotFound)` when a mutation matched nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::DomainResult;
use crate::feed::{FeedPlan, Page};
use crate::models::{
    Comment, CommentContext, CommentView, Community, CommunityDetails, CommunityOverview,
    CommunitySummary, PendingToken, Post, PostDetails, PostSummary, Role, User,
    UserCredentials, VoteTarget, VoteValue,
};

/// A named resource collection whose members carry unique slugs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlugCollection {
    Communities,
    Posts,
}

impl SlugCollection {
    pub fn table(self) -> &'static str {
        match self {
            Self::Communities => "communities",
            Self::Posts => "posts",
        }
    }
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn find_by_name(&self, name: &str) -> DomainResult<Option<Role>>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SlugRepository: Send + Sync {
    /// Whether `slug` is taken in `collection`, ignoring the resource `except`.
    async fn slug_exists(
        &self,
        collection: SlugCollection,
        slug: &str,
        except: Option<Uuid>,
    ) -> DomainResult<bool>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CommunityRepository: Send + Sync {
    /// Inserts the community and enrols its creator with `owner_role` as one unit.
    /// Fails with `SlugTaken` if the slug lost a race.
    async fn create_with_owner(&self, community: &Community, owner_role: &str) -> DomainResult<()>;
    async fn find_by_slug(&self, slug: &str, viewer: Uuid) -> DomainResult<Option<CommunityDetails>>;
    /// Ordered by member count, most populated first.
    async fn list(
        &self,
        viewer: Uuid,
        search: Option<String>,
        page: Page,
    ) -> DomainResult<Vec<CommunitySummary>>;
    async fn list_joined(&self, viewer: Uuid, page: Page) -> DomainResult<Vec<CommunityOverview>>;
    async fn update(&self, community: &Community) -> DomainResult<()>;
    async fn delete(&self, id: Uuid) -> DomainResult<()>;
    /// Idempotent: joining twice keeps the first membership.
    async fn join(&self, community_id: Uuid, user_id: Uuid, role: &str) -> DomainResult<()>;
    async fn leave(&self, community_id: Uuid, user_id: Uuid) -> DomainResult<()>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, post: &Post) -> DomainResult<()>;
    async fn find_by_slug(&self, slug: &str, viewer: Uuid) -> DomainResult<Option<PostDetails>>;
    async fn update(&self, post: &Post) -> DomainResult<()>;
    async fn delete(&self, id: Uuid) -> DomainResult<()>;
    /// Executes a feed plan, returning the page and the total match count.
    async fn fetch_feed(&self, plan: &FeedPlan) -> DomainResult<(Vec<PostSummary>, u64)>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(&self, comment: &Comment) -> DomainResult<()>;
    async fn find_by_id(&self, id: Uuid, viewer: Uuid) -> DomainResult<Option<CommentContext>>;
    /// Ordered by creation time, oldest first.
    async fn list_for_post(&self, post_id: Uuid, viewer: Uuid) -> DomainResult<Vec<CommentView>>;
    async fn update(&self, comment: &Comment) -> DomainResult<()>;
    async fn delete(&self, id: Uuid) -> DomainResult<()>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait VoteRepository: Send + Sync {
    /// Atomic insert-or-update keyed by (voter, target).
    async fn upsert(&self, voter: Uuid, target: VoteTarget, value: VoteValue) -> DomainResult<()>;
    async fn aggregate(&self, target: VoteTarget) -> DomainResult<i64>;
    async fn viewer_vote(&self, voter: Uuid, target: VoteTarget) -> DomainResult<VoteValue>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Creates an inactive user and its invitation token as one unit.
    async fn create_with_invitation(
        &self,
        user: &User,
        password_hash: &str,
        invitation: &PendingToken,
    ) -> DomainResult<()>;
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<User>>;
    async fn find_by_username(&self, username: &str) -> DomainResult<Option<User>>;
    /// Writes name, username and bio. A taken username is a conflict.
    async fn update(&self, user: &User) -> DomainResult<()>;
    async fn delete(&self, id: Uuid) -> DomainResult<()>;
    async fn find_credentials_by_email(&self, email: &str) -> DomainResult<Option<UserCredentials>>;
    async fn store_token(&self, token: &PendingToken) -> DomainResult<()>;
    /// Consumes an unexpired invitation and activates its user as one unit.
    async fn activate(&self, token_hash: &str, now: DateTime<Utc>) -> DomainResult<()>;
    /// Consumes an unexpired reset token and replaces the password hash as one unit.
    async fn reset_password(
        &self,
        token_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<()>;
}

/// Password hashing contract.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> DomainResult<String>;
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// Session token contract.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait TokenIssuer: Send + Sync {
    fn issue(&self, user_id: Uuid) -> DomainResult<String>;
    /// Returns the user id carried by a valid token.
    fn verify(&self, token: &str) -> DomainResult<Uuid>;
}

/// Outbound account notifications. Rendering and delivery live outside the core.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_invitation(&self, user: &User, activation_url: &str) -> DomainResult<()>;
    async fn send_password_reset(&self, user: &User, reset_url: &str) -> DomainResult<()>;
}
