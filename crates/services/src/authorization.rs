//! # Role/Permission Resolver
//!
//! Decides whether a viewer may mutate a community, post or comment.
//! Access is granted, in this order, by:
//!
//! 1. ownership (the viewer created the resource),
//! 2. the viewer's role in the resource's community,
//! 3. the viewer's global role.
//!
//! Roles compare by level only. A viewer without a membership holds the
//! synthetic visitor role, which sits below every seeded role.

use std::fmt;
use std::sync::Arc;

use domains::{
    role_names, CommentContext, CommunityDetails, DomainError, DomainResult, PostDetails, Role,
    User,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::roles::RoleCatalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Community,
    Post,
    Comment,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Community => "community",
            Self::Post => "post",
            Self::Comment => "comment",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A loaded resource together with the viewer's role in its community.
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    Community(&'a CommunityDetails),
    Post(&'a PostDetails),
    Comment(&'a CommentContext),
}

impl Resource<'_> {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Community(_) => ResourceKind::Community,
            Self::Post(_) => ResourceKind::Post,
            Self::Comment(_) => ResourceKind::Comment,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::Community(c) => c.community.id,
            Self::Post(p) => p.post.id,
            Self::Comment(c) => c.comment.id,
        }
    }

    pub fn owner_id(&self) -> Uuid {
        match self {
            Self::Community(c) => c.community.creator_id,
            Self::Post(p) => p.post.author_id,
            Self::Comment(c) => c.comment.author_id,
        }
    }

    pub fn community_role(&self) -> &Role {
        match self {
            Self::Community(c) => &c.viewer_role,
            Self::Post(p) => &p.community.viewer_role,
            Self::Comment(c) => &c.viewer_role,
        }
    }
}

/// What made an allowed decision allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    Ownership,
    CommunityRole,
    GlobalRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow(Grant),
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allow(_))
    }
}

/// The pure decision rule. Performs no I/O.
pub fn resolve(
    viewer_id: Uuid,
    global_role: &Role,
    community_role: &Role,
    owner_id: Uuid,
    required: &Role,
) -> Decision {
    if viewer_id == owner_id {
        Decision::Allow(Grant::Ownership)
    } else if community_role.satisfies(required) {
        Decision::Allow(Grant::CommunityRole)
    } else if global_role.satisfies(required) {
        Decision::Allow(Grant::GlobalRole)
    } else {
        Decision::Deny
    }
}

/// Resolves role names against the catalog and applies [`resolve`].
pub struct Authorizer {
    roles: Arc<RoleCatalog>,
}

impl Authorizer {
    pub fn new(roles: Arc<RoleCatalog>) -> Self {
        Self { roles }
    }

    /// Ok with the grant reason, or `Forbidden`.
    pub async fn authorize(
        &self,
        viewer: &User,
        resource: Resource<'_>,
        required_role: &str,
    ) -> DomainResult<Grant> {
        let required = self.roles.get(required_role).await?;

        match resolve(
            viewer.id,
            &viewer.role,
            resource.community_role(),
            resource.owner_id(),
            &required,
        ) {
            Decision::Allow(grant) => {
                debug!(
                    viewer = %viewer.id,
                    kind = %resource.kind(),
                    resource = %resource.id(),
                    ?grant,
                    "access granted"
                );
                Ok(grant)
            }
            Decision::Deny => {
                warn!(
                    viewer = %viewer.id,
                    kind = %resource.kind(),
                    resource = %resource.id(),
                    required = required_role,
                    "access denied"
                );
                Err(DomainError::Forbidden(format!(
                    "{} role or higher required for this {}",
                    required.name,
                    resource.kind()
                )))
            }
        }
    }

    /// Creating content requires a community role of at least `member`.
    /// Global roles do not count: site admins must join like anyone else.
    pub async fn require_membership(&self, community_role: &Role) -> DomainResult<()> {
        let member = self.roles.get(role_names::MEMBER).await?;
        if community_role.satisfies(&member) {
            Ok(())
        } else {
            Err(DomainError::Forbidden(
                "join the community before contributing to it".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domains::{Community, MockRoleRepository};

    fn role(name: &str) -> Role {
        let (id, level) = match name {
            role_names::USER => (1, 1),
            role_names::MEMBER => (2, 10),
            role_names::MODERATOR => (3, 15),
            role_names::ADMIN => (4, 20),
            _ => return Role::visitor(),
        };
        Role {
            id,
            name: name.to_string(),
            level,
        }
    }

    fn authorizer() -> Authorizer {
        let mut repo = MockRoleRepository::new();
        repo.expect_find_by_name().returning(|name| {
            let found = role(name);
            Ok((!found.is_visitor()).then_some(found))
        });
        Authorizer::new(Arc::new(RoleCatalog::new(Arc::new(repo))))
    }

    fn user(global: &str) -> User {
        User {
            id: Uuid::now_v7(),
            name: "Ada Lovelace".into(),
            username: "ada".into(),
            email: "ada@example.com".into(),
            bio: None,
            avatar_id: None,
            role: role(global),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn community(creator: &User, viewer_role: Role) -> CommunityDetails {
        CommunityDetails {
            community: Community {
                id: Uuid::now_v7(),
                name: "Rustaceans United".into(),
                slug: "rustaceans-united".into(),
                description: "A place to talk about ownership and borrowing.".into(),
                thumbnail_id: None,
                creator_id: creator.id,
                created_at: Utc::now(),
            },
            creator: creator.overview(),
            viewer_role,
            num_members: 1,
            num_posts: 0,
        }
    }

    #[test]
    fn resolution_order_is_owner_then_community_then_global() {
        let viewer = Uuid::now_v7();
        let other = Uuid::now_v7();
        let admin = role(role_names::ADMIN);
        let user = role(role_names::USER);
        let visitor = Role::visitor();

        assert_eq!(
            resolve(viewer, &user, &visitor, viewer, &admin),
            Decision::Allow(Grant::Ownership)
        );
        assert_eq!(
            resolve(viewer, &admin, &admin, other, &admin),
            Decision::Allow(Grant::CommunityRole)
        );
        assert_eq!(
            resolve(viewer, &admin, &visitor, other, &admin),
            Decision::Allow(Grant::GlobalRole)
        );
        assert_eq!(resolve(viewer, &user, &visitor, other, &admin), Decision::Deny);
    }

    #[test]
    fn moderator_may_delete_but_not_update() {
        let viewer = Uuid::now_v7();
        let author = Uuid::now_v7();
        let moderator = role(role_names::MODERATOR);
        let user = role(role_names::USER);

        assert!(resolve(viewer, &user, &moderator, author, &role(role_names::MODERATOR)).is_allowed());
        assert!(!resolve(viewer, &user, &moderator, author, &role(role_names::ADMIN)).is_allowed());
    }

    #[test]
    fn resource_kind_names_the_collection() {
        assert_eq!(ResourceKind::Post.to_string(), "post");
        assert_eq!(ResourceKind::Comment.as_str(), "comment");
    }

    #[tokio::test]
    async fn member_cannot_administer_but_creator_can() {
        let authz = authorizer();
        let creator = user(role_names::USER);
        let member = user(role_names::USER);

        let as_member = community(&creator, role(role_names::MEMBER));
        let err = authz
            .authorize(&member, Resource::Community(&as_member), role_names::ADMIN)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        let as_creator = community(&creator, role(role_names::ADMIN));
        let grant = authz
            .authorize(&creator, Resource::Community(&as_creator), role_names::ADMIN)
            .await
            .unwrap();
        assert_eq!(grant, Grant::Ownership);
    }

    #[tokio::test]
    async fn global_admin_overrides_missing_membership() {
        let authz = authorizer();
        let creator = user(role_names::USER);
        let site_admin = user(role_names::ADMIN);
        let details = community(&creator, Role::visitor());

        let grant = authz
            .authorize(&site_admin, Resource::Community(&details), role_names::ADMIN)
            .await
            .unwrap();
        assert_eq!(grant, Grant::GlobalRole);
    }

    #[tokio::test]
    async fn unknown_required_role_is_internal() {
        let authz = authorizer();
        let creator = user(role_names::USER);
        let details = community(&creator, Role::visitor());
        let err = authz
            .authorize(&creator, Resource::Community(&details), "overlord")
            .await
            .unwrap_err();
        assert!(err.is_internal());
    }

    #[tokio::test]
    async fn membership_gate_ignores_global_role() {
        let authz = authorizer();
        assert!(authz.require_membership(&role(role_names::MEMBER)).await.is_ok());
        assert!(authz.require_membership(&role(role_names::ADMIN)).await.is_ok());
        assert!(authz.require_membership(&Role::visitor()).await.is_err());
        // The global "user" role sits below "member".
        assert!(authz.require_membership(&role(role_names::USER)).await.is_err());
    }
}
