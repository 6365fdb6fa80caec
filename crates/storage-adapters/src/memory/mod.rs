//! # In-memory Adapter
//!
//! A `DashMap`-backed implementation of every repository port. It mirrors
//! the relational schema's constraints (unique slugs, unique emails and
//! usernames, cascading deletes, `SET NULL` on a deleted parent comment)
//! so services behave the same against it as against PostgreSQL.
//!
//! Used by the test suites and by `--storage memory` for local runs.

mod feed;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use domains::{
    role_names, Comment, CommentContext, CommentRepository, CommentView, Community,
    CommunityDetails, CommunityOverview, CommunityRepository, CommunitySummary, DomainError,
    DomainResult, FeedPlan, Membership, Page, PendingToken, Post, PostCommunity, PostDetails,
    PostRepository, PostStats, PostSummary, Role, RoleRepository, SlugCollection, SlugRepository,
    TokenPurpose, User, UserCredentials, UserOverview, UserRepository, VoteRepository,
    VoteTarget, VoteValue,
};
use tracing::debug;
use uuid::Uuid;

const MISSING_REFERENCE: DomainError = DomainError::NotFound("referenced resource");

fn seeded_roles() -> Vec<Role> {
    [
        (1, role_names::USER, 1),
        (2, role_names::MEMBER, 10),
        (3, role_names::MODERATOR, 15),
        (4, role_names::ADMIN, 20),
    ]
    .into_iter()
    .map(|(id, name, level)| Role {
        id,
        name: name.to_string(),
        level,
    })
    .collect()
}

struct StoredUser {
    user: User,
    password_hash: String,
}

pub struct MemoryStore {
    roles: Vec<Role>,
    users: DashMap<Uuid, StoredUser>,
    emails: DashMap<String, Uuid>,
    usernames: DashMap<String, Uuid>,
    tokens: DashMap<String, PendingToken>,
    communities: DashMap<Uuid, Community>,
    /// Keyed by (community, user).
    memberships: DashMap<(Uuid, Uuid), Membership>,
    posts: DashMap<Uuid, Post>,
    comments: DashMap<Uuid, Comment>,
    votes: DashMap<(Uuid, VoteTarget), VoteValue>,
    slugs: DashMap<(SlugCollection, String), Uuid>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            roles: seeded_roles(),
            users: DashMap::new(),
            emails: DashMap::new(),
            usernames: DashMap::new(),
            tokens: DashMap::new(),
            communities: DashMap::new(),
            memberships: DashMap::new(),
            posts: DashMap::new(),
            comments: DashMap::new(),
            votes: DashMap::new(),
            slugs: DashMap::new(),
        }
    }

    fn role_named(&self, name: &str) -> DomainResult<Role> {
        self.roles
            .iter()
            .find(|r| r.name == name)
            .cloned()
            .ok_or_else(|| DomainError::UnknownRole(name.to_string()))
    }

    // ── Slugs ───────────────────────────────────────────────────────────────

    fn claim_slug(&self, collection: SlugCollection, slug: &str, owner: Uuid) -> DomainResult<()> {
        match self.slugs.entry((collection, slug.to_string())) {
            Entry::Occupied(taken) if *taken.get() != owner => {
                Err(DomainError::SlugTaken(slug.to_string()))
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(free) => {
                free.insert(owner);
                Ok(())
            }
        }
    }

    fn release_slug(&self, collection: SlugCollection, slug: &str) {
        self.slugs.remove(&(collection, slug.to_string()));
    }

    /// Claims `new` before releasing `old`, so a failed rename keeps the old slug.
    fn move_slug(&self, collection: SlugCollection, old: &str, new: &str, owner: Uuid) -> DomainResult<()> {
        if old != new {
            self.claim_slug(collection, new, owner)?;
            self.release_slug(collection, old);
        }
        Ok(())
    }

    // ── Read helpers ────────────────────────────────────────────────────────

    fn user_overview(&self, id: Uuid) -> Option<UserOverview> {
        self.users.get(&id).map(|u| u.user.overview())
    }

    fn viewer_role(&self, community: Uuid, viewer: Uuid) -> Role {
        self.memberships
            .get(&(community, viewer))
            .map(|m| m.role.clone())
            .unwrap_or_else(Role::visitor)
    }

    fn member_count(&self, community: Uuid) -> i64 {
        self.memberships
            .iter()
            .filter(|m| m.key().0 == community)
            .count() as i64
    }

    fn is_member(&self, community: Uuid, user: Uuid) -> bool {
        self.memberships.contains_key(&(community, user))
    }

    fn score(&self, target: VoteTarget) -> i64 {
        self.votes
            .iter()
            .filter(|v| v.key().1 == target)
            .map(|v| i64::from(v.value().get()))
            .sum()
    }

    fn vote_of(&self, voter: Uuid, target: VoteTarget) -> VoteValue {
        self.votes
            .get(&(voter, target))
            .map(|v| *v)
            .unwrap_or_default()
    }

    fn post_stats(&self, post: Uuid, viewer: Uuid) -> PostStats {
        PostStats {
            score: self.score(VoteTarget::Post(post)),
            viewer_vote: self.vote_of(viewer, VoteTarget::Post(post)).get(),
            num_comments: self.comments.iter().filter(|c| c.post_id == post).count() as i64,
        }
    }

    fn summarize(&self, post: &Post, viewer: Uuid) -> Option<PostSummary> {
        let community = self.communities.get(&post.community_id)?.overview();
        let author = self.user_overview(post.author_id)?;
        Some(PostSummary {
            post: post.clone(),
            community,
            author,
            stats: self.post_stats(post.id, viewer),
        })
    }

    fn community_summary(&self, community: &Community, viewer: Uuid) -> CommunitySummary {
        CommunitySummary {
            community: community.clone(),
            viewer_role: self.viewer_role(community.id, viewer),
            num_members: self.member_count(community.id),
        }
    }

    // ── Cascades ────────────────────────────────────────────────────────────

    fn remove_comment(&self, id: Uuid) -> Option<Comment> {
        let (_, removed) = self.comments.remove(&id)?;
        for mut reply in self.comments.iter_mut() {
            if reply.parent_id == Some(id) {
                reply.parent_id = None;
            }
        }
        self.votes.retain(|(_, target), _| *target != VoteTarget::Comment(id));
        Some(removed)
    }

    fn remove_post(&self, id: Uuid) -> Option<Post> {
        let (_, removed) = self.posts.remove(&id)?;
        self.release_slug(SlugCollection::Posts, &removed.slug);

        let replies: Vec<Uuid> = self
            .comments
            .iter()
            .filter(|c| c.post_id == id)
            .map(|c| c.id)
            .collect();
        for reply in replies {
            self.remove_comment(reply);
        }
        self.votes.retain(|(_, target), _| *target != VoteTarget::Post(id));
        Some(removed)
    }

    fn remove_community(&self, id: Uuid) -> Option<Community> {
        let (_, removed) = self.communities.remove(&id)?;
        self.release_slug(SlugCollection::Communities, &removed.slug);

        let posts: Vec<Uuid> = self
            .posts
            .iter()
            .filter(|p| p.community_id == id)
            .map(|p| p.id)
            .collect();
        for post in posts {
            self.remove_post(post);
        }
        self.memberships.retain(|(community, _), _| *community != id);
        Some(removed)
    }

    /// Consumes an unexpired token of `purpose`, along with its siblings.
    fn consume_token(&self, token_hash: &str, purpose: TokenPurpose, now: DateTime<Utc>) -> Option<Uuid> {
        let (_, token) = self
            .tokens
            .remove_if(token_hash, |_, t| t.purpose == purpose && t.expires_at > now)?;
        self.tokens
            .retain(|_, t| !(t.user_id == token.user_id && t.purpose == purpose));
        Some(token.user_id)
    }
}

#[async_trait]
impl RoleRepository for MemoryStore {
    async fn find_by_name(&self, name: &str) -> DomainResult<Option<Role>> {
        Ok(self.roles.iter().find(|r| r.name == name).cloned())
    }
}

#[async_trait]
impl SlugRepository for MemoryStore {
    async fn slug_exists(
        &self,
        collection: SlugCollection,
        slug: &str,
        except: Option<Uuid>,
    ) -> DomainResult<bool> {
        Ok(self
            .slugs
            .get(&(collection, slug.to_string()))
            .is_some_and(|owner| Some(*owner) != except))
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_with_invitation(
        &self,
        user: &User,
        password_hash: &str,
        invitation: &PendingToken,
    ) -> DomainResult<()> {
        let conflict = || DomainError::Conflict("email or username already in use".to_string());

        match self.emails.entry(user.email.clone()) {
            Entry::Occupied(_) => return Err(conflict()),
            Entry::Vacant(free) => {
                free.insert(user.id);
            }
        }
        match self.usernames.entry(user.username.clone()) {
            Entry::Occupied(_) => {
                self.emails.remove(&user.email);
                return Err(conflict());
            }
            Entry::Vacant(free) => {
                free.insert(user.id);
            }
        }

        self.users.insert(
            user.id,
            StoredUser {
                user: user.clone(),
                password_hash: password_hash.to_string(),
            },
        );
        self.tokens
            .insert(invitation.token_hash.clone(), invitation.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<User>> {
        Ok(self.users.get(&id).map(|u| u.user.clone()))
    }

    async fn find_by_username(&self, username: &str) -> DomainResult<Option<User>> {
        let Some(id) = self.usernames.get(username).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|u| u.user.clone()))
    }

    async fn update(&self, user: &User) -> DomainResult<()> {
        let mut stored = self
            .users
            .get_mut(&user.id)
            .ok_or(DomainError::NotFound("user"))?;

        if stored.user.username != user.username {
            match self.usernames.entry(user.username.clone()) {
                Entry::Occupied(_) => {
                    return Err(DomainError::Conflict(
                        "email or username already in use".to_string(),
                    ))
                }
                Entry::Vacant(free) => {
                    free.insert(user.id);
                }
            }
            self.usernames.remove(&stored.user.username);
        }

        stored.user.name = user.name.clone();
        stored.user.username = user.username.clone();
        stored.user.bio = user.bio.clone();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        let (_, stored) = self.users.remove(&id).ok_or(DomainError::NotFound("user"))?;
        self.emails.remove(&stored.user.email);
        self.usernames.remove(&stored.user.username);
        self.tokens.retain(|_, t| t.user_id != id);

        let owned: Vec<Uuid> = self
            .communities
            .iter()
            .filter(|c| c.creator_id == id)
            .map(|c| c.id)
            .collect();
        for community in owned {
            self.remove_community(community);
        }
        let posts: Vec<Uuid> = self
            .posts
            .iter()
            .filter(|p| p.author_id == id)
            .map(|p| p.id)
            .collect();
        for post in posts {
            self.remove_post(post);
        }
        let comments: Vec<Uuid> = self
            .comments
            .iter()
            .filter(|c| c.author_id == id)
            .map(|c| c.id)
            .collect();
        for comment in comments {
            self.remove_comment(comment);
        }
        self.memberships.retain(|(_, user), _| *user != id);
        self.votes.retain(|(voter, _), _| *voter != id);
        Ok(())
    }

    async fn find_credentials_by_email(&self, email: &str) -> DomainResult<Option<UserCredentials>> {
        let Some(id) = self.emails.get(email).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|stored| UserCredentials {
            user: stored.user.clone(),
            password_hash: stored.password_hash.clone(),
        }))
    }

    async fn store_token(&self, token: &PendingToken) -> DomainResult<()> {
        if !self.users.contains_key(&token.user_id) {
            return Err(MISSING_REFERENCE);
        }
        self.tokens.insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn activate(&self, token_hash: &str, now: DateTime<Utc>) -> DomainResult<()> {
        let user_id = self
            .consume_token(token_hash, TokenPurpose::Invitation, now)
            .ok_or(DomainError::NotFound("invitation"))?;
        if let Some(mut stored) = self.users.get_mut(&user_id) {
            stored.user.is_active = true;
        }
        Ok(())
    }

    async fn reset_password(
        &self,
        token_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let user_id = self
            .consume_token(token_hash, TokenPurpose::PasswordReset, now)
            .ok_or(DomainError::NotFound("password reset"))?;
        if let Some(mut stored) = self.users.get_mut(&user_id) {
            stored.password_hash = password_hash.to_string();
        }
        Ok(())
    }
}

#[async_trait]
impl CommunityRepository for MemoryStore {
    async fn create_with_owner(&self, community: &Community, owner_role: &str) -> DomainResult<()> {
        let role = self.role_named(owner_role)?;
        if !self.users.contains_key(&community.creator_id) {
            return Err(MISSING_REFERENCE);
        }
        self.claim_slug(SlugCollection::Communities, &community.slug, community.id)?;

        self.communities.insert(community.id, community.clone());
        self.memberships.insert(
            (community.id, community.creator_id),
            Membership {
                user_id: community.creator_id,
                community_id: community.id,
                role,
                joined_at: community.created_at,
            },
        );
        Ok(())
    }

    async fn find_by_slug(&self, slug: &str, viewer: Uuid) -> DomainResult<Option<CommunityDetails>> {
        let Some(id) = self
            .slugs
            .get(&(SlugCollection::Communities, slug.to_string()))
            .map(|id| *id)
        else {
            return Ok(None);
        };
        let Some(community) = self.communities.get(&id).map(|c| c.clone()) else {
            return Ok(None);
        };
        let Some(creator) = self.user_overview(community.creator_id) else {
            return Ok(None);
        };

        Ok(Some(CommunityDetails {
            viewer_role: self.viewer_role(id, viewer),
            num_members: self.member_count(id),
            num_posts: self.posts.iter().filter(|p| p.community_id == id).count() as i64,
            creator,
            community,
        }))
    }

    async fn list(
        &self,
        viewer: Uuid,
        search: Option<String>,
        page: Page,
    ) -> DomainResult<Vec<CommunitySummary>> {
        let needle = search.map(|s| s.to_lowercase());
        let mut found: Vec<CommunitySummary> = self
            .communities
            .iter()
            .filter(|c| {
                needle
                    .as_deref()
                    .map_or(true, |n| c.name.to_lowercase().contains(n))
            })
            .map(|c| self.community_summary(&c, viewer))
            .collect();

        found.sort_by(|a, b| {
            (b.num_members, b.community.created_at, b.community.id).cmp(&(
                a.num_members,
                a.community.created_at,
                a.community.id,
            ))
        });
        Ok(paged(found, page))
    }

    async fn list_joined(&self, viewer: Uuid, page: Page) -> DomainResult<Vec<CommunityOverview>> {
        let mut joined: Vec<(DateTime<Utc>, CommunityOverview)> = self
            .memberships
            .iter()
            .filter(|m| m.user_id == viewer)
            .filter_map(|m| {
                self.communities
                    .get(&m.community_id)
                    .map(|c| (m.joined_at, c.overview()))
            })
            .collect();

        joined.sort_by(|a, b| (b.0, b.1.id).cmp(&(a.0, a.1.id)));
        Ok(paged(joined, page).into_iter().map(|(_, c)| c).collect())
    }

    async fn update(&self, community: &Community) -> DomainResult<()> {
        let old_slug = self
            .communities
            .get(&community.id)
            .map(|c| c.slug.clone())
            .ok_or(DomainError::NotFound("community"))?;
        self.move_slug(SlugCollection::Communities, &old_slug, &community.slug, community.id)?;
        self.communities.insert(community.id, community.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        self.remove_community(id)
            .map(|_| ())
            .ok_or(DomainError::NotFound("community"))
    }

    async fn join(&self, community_id: Uuid, user_id: Uuid, role: &str) -> DomainResult<()> {
        let role = self.role_named(role)?;
        if !self.communities.contains_key(&community_id) || !self.users.contains_key(&user_id) {
            return Err(MISSING_REFERENCE);
        }
        self.memberships
            .entry((community_id, user_id))
            .or_insert_with(|| Membership {
                user_id,
                community_id,
                role,
                joined_at: Utc::now(),
            });
        Ok(())
    }

    async fn leave(&self, community_id: Uuid, user_id: Uuid) -> DomainResult<()> {
        self.memberships.remove(&(community_id, user_id));
        Ok(())
    }
}

#[async_trait]
impl PostRepository for MemoryStore {
    async fn create(&self, post: &Post) -> DomainResult<()> {
        if !self.communities.contains_key(&post.community_id) || !self.users.contains_key(&post.author_id) {
            return Err(MISSING_REFERENCE);
        }
        self.claim_slug(SlugCollection::Posts, &post.slug, post.id)?;
        self.posts.insert(post.id, post.clone());
        Ok(())
    }

    async fn find_by_slug(&self, slug: &str, viewer: Uuid) -> DomainResult<Option<PostDetails>> {
        let Some(id) = self
            .slugs
            .get(&(SlugCollection::Posts, slug.to_string()))
            .map(|id| *id)
        else {
            return Ok(None);
        };
        let Some(post) = self.posts.get(&id).map(|p| p.clone()) else {
            return Ok(None);
        };
        let Some(summary) = self.summarize(&post, viewer) else {
            return Ok(None);
        };

        Ok(Some(PostDetails {
            community: PostCommunity {
                viewer_role: self.viewer_role(post.community_id, viewer),
                num_members: self.member_count(post.community_id),
                overview: summary.community,
            },
            post: summary.post,
            author: summary.author,
            stats: summary.stats,
        }))
    }

    async fn update(&self, post: &Post) -> DomainResult<()> {
        let old_slug = self
            .posts
            .get(&post.id)
            .map(|p| p.slug.clone())
            .ok_or(DomainError::NotFound("post"))?;
        self.move_slug(SlugCollection::Posts, &old_slug, &post.slug, post.id)?;
        self.posts.insert(post.id, post.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        self.remove_post(id)
            .map(|_| ())
            .ok_or(DomainError::NotFound("post"))
    }

    async fn fetch_feed(&self, plan: &FeedPlan) -> DomainResult<(Vec<PostSummary>, u64)> {
        let candidates: Vec<Post> = self
            .posts
            .iter()
            .filter(|p| plan.predicates.iter().all(|pred| feed::matches(self, p, pred, plan.viewer)))
            .map(|p| p.clone())
            .collect();

        let mut matched: Vec<PostSummary> = candidates
            .iter()
            .filter_map(|p| self.summarize(p, plan.viewer))
            .collect();
        matched.sort_by(|a, b| feed::compare(a, b, plan.order));

        let total = matched.len() as u64;
        debug!(total, "feed plan evaluated in memory");
        Ok((paged(matched, plan.page), total))
    }
}

#[async_trait]
impl CommentRepository for MemoryStore {
    async fn create(&self, comment: &Comment) -> DomainResult<()> {
        if !self.posts.contains_key(&comment.post_id) || !self.users.contains_key(&comment.author_id) {
            return Err(MISSING_REFERENCE);
        }
        if let Some(parent) = comment.parent_id {
            if !self.comments.contains_key(&parent) {
                return Err(MISSING_REFERENCE);
            }
        }
        self.comments.insert(comment.id, comment.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid, viewer: Uuid) -> DomainResult<Option<CommentContext>> {
        let Some(comment) = self.comments.get(&id).map(|c| c.clone()) else {
            return Ok(None);
        };
        let Some(community_id) = self.posts.get(&comment.post_id).map(|p| p.community_id) else {
            return Ok(None);
        };
        Ok(Some(CommentContext {
            viewer_role: self.viewer_role(community_id, viewer),
            community_id,
            comment,
        }))
    }

    async fn list_for_post(&self, post_id: Uuid, viewer: Uuid) -> DomainResult<Vec<CommentView>> {
        let mut found: Vec<Comment> = self
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .map(|c| c.clone())
            .collect();
        found.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));

        Ok(found
            .into_iter()
            .filter_map(|comment| {
                let author = self.user_overview(comment.author_id)?;
                let target = VoteTarget::Comment(comment.id);
                Some(CommentView {
                    score: self.score(target),
                    viewer_vote: self.vote_of(viewer, target).get(),
                    author,
                    comment,
                })
            })
            .collect())
    }

    async fn update(&self, comment: &Comment) -> DomainResult<()> {
        let mut stored = self
            .comments
            .get_mut(&comment.id)
            .ok_or(DomainError::NotFound("comment"))?;
        stored.content = comment.content.clone();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        self.remove_comment(id)
            .map(|_| ())
            .ok_or(DomainError::NotFound("comment"))
    }
}

#[async_trait]
impl VoteRepository for MemoryStore {
    async fn upsert(&self, voter: Uuid, target: VoteTarget, value: VoteValue) -> DomainResult<()> {
        let target_exists = match target {
            VoteTarget::Post(id) => self.posts.contains_key(&id),
            VoteTarget::Comment(id) => self.comments.contains_key(&id),
        };
        if !target_exists || !self.users.contains_key(&voter) {
            return Err(MISSING_REFERENCE);
        }
        self.votes.insert((voter, target), value);
        Ok(())
    }

    async fn aggregate(&self, target: VoteTarget) -> DomainResult<i64> {
        Ok(self.score(target))
    }

    async fn viewer_vote(&self, voter: Uuid, target: VoteTarget) -> DomainResult<VoteValue> {
        Ok(self.vote_of(voter, target))
    }
}

fn paged<T>(items: Vec<T>, page: Page) -> Vec<T> {
    items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .collect()
}
