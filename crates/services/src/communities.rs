//! # Communities
//!
//! Creation enrols the creator as the community's admin in the same unit
//! of work. Renaming re-derives the slug; a community never collides with
//! its own current slug.

use std::sync::Arc;

use chrono::Utc;
use domains::{
    role_names, Community, CommunityDetails, CommunityOverview, CommunityRepository,
    CommunitySummary, DomainError, DomainResult, Page, SlugCollection, User,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::authorization::{Authorizer, Resource};
use crate::slug::SlugGenerator;
use crate::validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewCommunityInput {
    #[validate(length(min = 8, max = 100, message = "name must be 8 to 100 characters"))]
    pub name: String,
    #[validate(length(min = 32, max = 255, message = "description must be 32 to 255 characters"))]
    pub description: String,
    pub thumbnail_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CommunityChanges {
    #[validate(length(min = 8, max = 100, message = "name must be 8 to 100 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 32, max = 255, message = "description must be 32 to 255 characters"))]
    pub description: Option<String>,
    pub thumbnail_id: Option<String>,
}

#[derive(Clone)]
pub struct CommunityService {
    communities: Arc<dyn CommunityRepository>,
    slugs: SlugGenerator,
    authorizer: Arc<Authorizer>,
}

impl CommunityService {
    pub fn new(
        communities: Arc<dyn CommunityRepository>,
        slugs: SlugGenerator,
        authorizer: Arc<Authorizer>,
    ) -> Self {
        Self {
            communities,
            slugs,
            authorizer,
        }
    }

    pub async fn create(&self, creator: &User, input: NewCommunityInput) -> DomainResult<Community> {
        validate(&input)?;

        let id = Uuid::now_v7();
        let created_at = Utc::now();
        let repo = Arc::clone(&self.communities);

        let community = self
            .slugs
            .claim(&input.name, SlugCollection::Communities, None, |slug| {
                let repo = Arc::clone(&repo);
                let community = Community {
                    id,
                    name: input.name.clone(),
                    slug,
                    description: input.description.clone(),
                    thumbnail_id: input.thumbnail_id.clone(),
                    creator_id: creator.id,
                    created_at,
                };
                async move {
                    repo.create_with_owner(&community, role_names::ADMIN)
                        .await
                        .map(|()| community)
                }
            })
            .await?;

        info!(community = %community.id, slug = %community.slug, creator = %creator.id, "community created");
        Ok(community)
    }

    pub async fn get(&self, slug: &str, viewer: Uuid) -> DomainResult<CommunityDetails> {
        self.communities
            .find_by_slug(slug, viewer)
            .await?
            .ok_or(DomainError::NotFound("community"))
    }

    pub async fn list(
        &self,
        viewer: Uuid,
        search: Option<String>,
        page: Page,
    ) -> DomainResult<Vec<CommunitySummary>> {
        self.communities.list(viewer, search, page).await
    }

    pub async fn list_joined(&self, viewer: Uuid, page: Page) -> DomainResult<Vec<CommunityOverview>> {
        self.communities.list_joined(viewer, page).await
    }

    pub async fn update(
        &self,
        viewer: &User,
        details: CommunityDetails,
        changes: CommunityChanges,
    ) -> DomainResult<Community> {
        self.authorizer
            .authorize(viewer, Resource::Community(&details), role_names::ADMIN)
            .await?;
        validate(&changes)?;

        let current = details.community;
        let renamed = changes.name.filter(|name| *name != current.name);
        let base = Community {
            description: changes.description.unwrap_or(current.description),
            thumbnail_id: changes.thumbnail_id.or(current.thumbnail_id),
            ..current
        };

        let Some(name) = renamed else {
            self.communities.update(&base).await?;
            return Ok(base);
        };

        let repo = Arc::clone(&self.communities);
        let updated = self
            .slugs
            .claim(&name, SlugCollection::Communities, Some(base.id), |slug| {
                let repo = Arc::clone(&repo);
                let community = Community {
                    name: name.clone(),
                    slug,
                    ..base.clone()
                };
                async move { repo.update(&community).await.map(|()| community) }
            })
            .await?;

        info!(community = %updated.id, slug = %updated.slug, "community renamed");
        Ok(updated)
    }

    pub async fn delete(&self, viewer: &User, details: CommunityDetails) -> DomainResult<()> {
        self.authorizer
            .authorize(viewer, Resource::Community(&details), role_names::ADMIN)
            .await?;
        self.communities.delete(details.community.id).await?;
        info!(community = %details.community.id, by = %viewer.id, "community deleted");
        Ok(())
    }

    /// Joining twice is a no-op.
    pub async fn join(&self, viewer: &User, details: &CommunityDetails) -> DomainResult<()> {
        self.communities
            .join(details.community.id, viewer.id, role_names::MEMBER)
            .await
    }

    /// The creator cannot leave their own community; the call is a no-op for them.
    /// Leaving without a membership is reported as not found.
    pub async fn leave(&self, viewer: &User, details: &CommunityDetails) -> DomainResult<()> {
        if details.viewer_role.is_visitor() {
            return Err(DomainError::NotFound("membership"));
        }
        if details.community.creator_id == viewer.id {
            info!(community = %details.community.id, "creator attempted to leave, ignored");
            return Ok(());
        }
        self.communities.leave(details.community.id, viewer.id).await
    }
}
