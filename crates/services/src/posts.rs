//! # Posts
//!
//! A post belongs to exactly one community and carries a slug unique
//! among all posts. Only members may create posts.

use std::sync::Arc;

use chrono::Utc;
use domains::{
    role_names, CommentNode, CommunityDetails, DomainError, DomainResult, Post, PostDetails,
    PostRepository, SlugCollection, User,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::authorization::{Authorizer, Resource};
use crate::slug::SlugGenerator;
use crate::validate;

pub const MAX_TAGS: usize = 5;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewPostInput {
    #[validate(length(min = 8, max = 100, message = "title must be 8 to 100 characters"))]
    pub title: String,
    #[validate(length(min = 100, max = 1000, message = "content must be 100 to 1000 characters"))]
    pub content: String,
    #[serde(default)]
    #[validate(length(max = 5, message = "at most 5 tags are allowed"))]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct PostChanges {
    #[validate(length(min = 8, max = 100, message = "title must be 8 to 100 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 100, max = 1000, message = "content must be 100 to 1000 characters"))]
    pub content: Option<String>,
    #[validate(length(max = 5, message = "at most 5 tags are allowed"))]
    pub tags: Option<Vec<String>>,
}

/// A single post page: the post and its comment forest.
#[derive(Debug, Clone, Serialize)]
pub struct PostPage {
    #[serde(flatten)]
    pub post: PostDetails,
    pub comments: Vec<CommentNode>,
}

/// Trims, lowercases and de-duplicates tags, keeping first occurrence order.
fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out.truncate(MAX_TAGS);
    out
}

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostRepository>,
    slugs: SlugGenerator,
    authorizer: Arc<Authorizer>,
}

impl PostService {
    pub fn new(posts: Arc<dyn PostRepository>, slugs: SlugGenerator, authorizer: Arc<Authorizer>) -> Self {
        Self {
            posts,
            slugs,
            authorizer,
        }
    }

    pub async fn create(
        &self,
        author: &User,
        community: &CommunityDetails,
        input: NewPostInput,
    ) -> DomainResult<Post> {
        self.authorizer
            .require_membership(&community.viewer_role)
            .await?;
        validate(&input)?;

        let id = Uuid::now_v7();
        let created_at = Utc::now();
        let tags = normalize_tags(input.tags);
        let repo = Arc::clone(&self.posts);

        let post = self
            .slugs
            .claim(&input.title, SlugCollection::Posts, None, |slug| {
                let repo = Arc::clone(&repo);
                let post = Post {
                    id,
                    title: input.title.clone(),
                    content: input.content.clone(),
                    slug,
                    tags: tags.clone(),
                    community_id: community.community.id,
                    author_id: author.id,
                    created_at,
                };
                async move { repo.create(&post).await.map(|()| post) }
            })
            .await?;

        info!(post = %post.id, slug = %post.slug, community = %post.community_id, "post created");
        Ok(post)
    }

    pub async fn get(&self, slug: &str, viewer: Uuid) -> DomainResult<PostDetails> {
        self.posts
            .find_by_slug(slug, viewer)
            .await?
            .ok_or(DomainError::NotFound("post"))
    }

    pub async fn update(
        &self,
        viewer: &User,
        details: PostDetails,
        changes: PostChanges,
    ) -> DomainResult<Post> {
        self.authorizer
            .authorize(viewer, Resource::Post(&details), role_names::ADMIN)
            .await?;
        validate(&changes)?;

        let current = details.post;
        let retitled = changes.title.filter(|title| *title != current.title);
        let base = Post {
            content: changes.content.unwrap_or(current.content),
            tags: changes.tags.map(normalize_tags).unwrap_or(current.tags),
            ..current
        };

        let Some(title) = retitled else {
            self.posts.update(&base).await?;
            return Ok(base);
        };

        let repo = Arc::clone(&self.posts);
        self.slugs
            .claim(&title, SlugCollection::Posts, Some(base.id), |slug| {
                let repo = Arc::clone(&repo);
                let post = Post {
                    title: title.clone(),
                    slug,
                    ..base.clone()
                };
                async move { repo.update(&post).await.map(|()| post) }
            })
            .await
    }

    pub async fn delete(&self, viewer: &User, details: PostDetails) -> DomainResult<()> {
        self.authorizer
            .authorize(viewer, Resource::Post(&details), role_names::MODERATOR)
            .await?;
        self.posts.delete(details.post.id).await?;
        info!(post = %details.post.id, by = %viewer.id, "post deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::RoleCatalog;
    use domains::{
        Community, CommunityOverview, MockPostRepository, MockRoleRepository, MockSlugRepository,
        PostCommunity, PostStats, Role,
    };

    fn role(name: &str, level: i32) -> Role {
        Role {
            id: i64::from(level),
            name: name.to_string(),
            level,
        }
    }

    fn authorizer() -> Arc<Authorizer> {
        let mut roles = MockRoleRepository::new();
        roles.expect_find_by_name().returning(|name| {
            Ok(match name {
                "member" => Some(role(name, 10)),
                "moderator" => Some(role(name, 15)),
                "admin" => Some(role(name, 20)),
                _ => None,
            })
        });
        Arc::new(Authorizer::new(Arc::new(RoleCatalog::new(Arc::new(roles)))))
    }

    fn free_slugs() -> SlugGenerator {
        let mut repo = MockSlugRepository::new();
        repo.expect_slug_exists().returning(|_, _, _| Ok(false));
        SlugGenerator::new(Arc::new(repo))
    }

    fn user() -> User {
        User {
            id: Uuid::now_v7(),
            name: "Margaret Hamilton".into(),
            username: "margaret".into(),
            email: "margaret@example.com".into(),
            bio: None,
            avatar_id: None,
            role: role("user", 1),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn community(creator: &User, viewer_role: Role) -> CommunityDetails {
        CommunityDetails {
            community: Community {
                id: Uuid::now_v7(),
                name: "Apollo Guidance".into(),
                slug: "apollo-guidance".into(),
                description: "Everything about the guidance computer and its software.".into(),
                thumbnail_id: None,
                creator_id: creator.id,
                created_at: Utc::now(),
            },
            creator: creator.overview(),
            viewer_role,
            num_members: 2,
            num_posts: 0,
        }
    }

    fn post_details(author: &User, viewer_role: Role) -> PostDetails {
        PostDetails {
            post: Post {
                id: Uuid::now_v7(),
                title: "Restart protection".into(),
                content: "x".repeat(120),
                slug: "restart-protection".into(),
                tags: vec![],
                community_id: Uuid::now_v7(),
                author_id: author.id,
                created_at: Utc::now(),
            },
            community: PostCommunity {
                overview: CommunityOverview {
                    id: Uuid::now_v7(),
                    name: "Apollo Guidance".into(),
                    slug: "apollo-guidance".into(),
                    thumbnail_id: None,
                },
                viewer_role,
                num_members: 2,
            },
            author: author.overview(),
            stats: PostStats::default(),
        }
    }

    fn input() -> NewPostInput {
        NewPostInput {
            title: "Priority displays".into(),
            content: "y".repeat(150),
            tags: vec![" Apollo ".into(), "apollo".into(), "AGC".into()],
        }
    }

    #[tokio::test]
    async fn visitor_cannot_post() {
        let service = PostService::new(Arc::new(MockPostRepository::new()), free_slugs(), authorizer());
        let creator = user();
        let err = service
            .create(&user(), &community(&creator, Role::visitor()), input())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
    }

    #[tokio::test]
    async fn member_posts_with_normalized_tags() {
        let mut repo = MockPostRepository::new();
        repo.expect_create()
            .withf(|post| post.slug == "priority-displays" && post.tags == ["apollo", "agc"])
            .times(1)
            .returning(|_| Ok(()));

        let service = PostService::new(Arc::new(repo), free_slugs(), authorizer());
        let creator = user();
        let author = user();
        let post = service
            .create(&author, &community(&creator, role("member", 10)), input())
            .await
            .unwrap();
        assert_eq!(post.author_id, author.id);
    }

    #[tokio::test]
    async fn short_content_is_rejected_after_gate() {
        let service = PostService::new(Arc::new(MockPostRepository::new()), free_slugs(), authorizer());
        let creator = user();
        let err = service
            .create(
                &user(),
                &community(&creator, role("member", 10)),
                NewPostInput {
                    content: "too short".into(),
                    ..input()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn moderator_deletes_but_cannot_edit() {
        let mut repo = MockPostRepository::new();
        repo.expect_delete().times(1).returning(|_| Ok(()));
        let service = PostService::new(Arc::new(repo), free_slugs(), authorizer());

        let author = user();
        let moderator = user();
        let err = service
            .update(
                &moderator,
                post_details(&author, role("moderator", 15)),
                PostChanges {
                    tags: Some(vec!["edited".into()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        service
            .delete(&moderator, post_details(&author, role("moderator", 15)))
            .await
            .unwrap();
    }

    #[test]
    fn tags_are_trimmed_and_unique() {
        let tags = normalize_tags(vec![
            "Rust".into(),
            " rust ".into(),
            "".into(),
            "async".into(),
        ]);
        assert_eq!(tags, ["rust", "async"]);
    }
}
