use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use domains::{Community, CommunityDetails, CommunitySummary, FeedScope, Paginated, Post, PostSummary};
use services::communities::{CommunityChanges, NewCommunityInput};
use services::posts::NewPostInput;
use services::{FeedParams, ListParams};

use crate::error::ApiResult;
use crate::extract::{CurrentUser, JsonBody};
use crate::state::AppState;

pub async fn list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<CommunitySummary>>> {
    let (search, page) = params.into_parts()?;
    Ok(Json(state.services.communities.list(user.id, search, page).await?))
}

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(input): JsonBody<NewCommunityInput>,
) -> ApiResult<(StatusCode, Json<Community>)> {
    let community = state.services.communities.create(&user, input).await?;
    state.metrics.record_event("community_created");
    Ok((StatusCode::CREATED, Json(community)))
}

pub async fn get(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(slug): Path<String>,
) -> ApiResult<Json<CommunityDetails>> {
    Ok(Json(state.services.communities.get(&slug, user.id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(slug): Path<String>,
    JsonBody(changes): JsonBody<CommunityChanges>,
) -> ApiResult<Json<Community>> {
    let communities = &state.services.communities;
    let details = communities.get(&slug, user.id).await?;
    Ok(Json(communities.update(&user, details, changes).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(slug): Path<String>,
) -> ApiResult<StatusCode> {
    let communities = &state.services.communities;
    let details = communities.get(&slug, user.id).await?;
    communities.delete(&user, details).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn join(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(slug): Path<String>,
) -> ApiResult<StatusCode> {
    let communities = &state.services.communities;
    let details = communities.get(&slug, user.id).await?;
    communities.join(&user, &details).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn leave(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(slug): Path<String>,
) -> ApiResult<StatusCode> {
    let communities = &state.services.communities;
    let details = communities.get(&slug, user.id).await?;
    communities.leave(&user, &details).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn feed(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(slug): Path<String>,
    Query(params): Query<FeedParams>,
) -> ApiResult<Json<Paginated<PostSummary>>> {
    // A malformed query is a 400 even for an unknown community.
    let mut query = params.into_query(FeedScope::Global)?;
    let details = state.services.communities.get(&slug, user.id).await?;
    query.scope = FeedScope::Community(details.community.id);
    Ok(Json(state.services.feed.fetch_posts(user.id, &query).await?))
}

pub async fn create_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(slug): Path<String>,
    JsonBody(input): JsonBody<NewPostInput>,
) -> ApiResult<(StatusCode, Json<Post>)> {
    let details = state.services.communities.get(&slug, user.id).await?;
    let post = state.services.posts.create(&user, &details, input).await?;
    state.metrics.record_event("post_created");
    Ok((StatusCode::CREATED, Json(post)))
}
