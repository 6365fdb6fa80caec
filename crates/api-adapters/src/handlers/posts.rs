use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use domains::{Comment, FeedScope, Paginated, Post, PostSummary, VoteTarget};
use services::comments::NewCommentInput;
use services::posts::PostChanges;
use services::{FeedParams, PostPage, VoteTally};

use super::{cast_vote, VoteBody};
use crate::error::ApiResult;
use crate::extract::{CurrentUser, JsonBody};
use crate::state::AppState;

/// Posts across every community.
pub async fn feed(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<FeedParams>,
) -> ApiResult<Json<Paginated<PostSummary>>> {
    let query = params.into_query(FeedScope::Global)?;
    Ok(Json(state.services.feed.fetch_posts(user.id, &query).await?))
}

/// The post with its comment forest.
pub async fn get(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(slug): Path<String>,
) -> ApiResult<Json<PostPage>> {
    let post = state.services.posts.get(&slug, user.id).await?;
    let comments = state
        .services
        .comments
        .tree_for_post(post.post.id, user.id)
        .await?;
    Ok(Json(PostPage { post, comments }))
}

pub async fn update(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(slug): Path<String>,
    JsonBody(changes): JsonBody<PostChanges>,
) -> ApiResult<Json<Post>> {
    let posts = &state.services.posts;
    let details = posts.get(&slug, user.id).await?;
    Ok(Json(posts.update(&user, details, changes).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(slug): Path<String>,
) -> ApiResult<StatusCode> {
    let posts = &state.services.posts;
    let details = posts.get(&slug, user.id).await?;
    posts.delete(&user, details).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn vote(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(slug): Path<String>,
    JsonBody(body): JsonBody<VoteBody>,
) -> ApiResult<Json<VoteTally>> {
    let details = state.services.posts.get(&slug, user.id).await?;
    let tally = cast_vote(&state, user.id, VoteTarget::Post(details.post.id), body.value).await?;
    Ok(Json(tally))
}

pub async fn comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(slug): Path<String>,
    JsonBody(input): JsonBody<NewCommentInput>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let details = state.services.posts.get(&slug, user.id).await?;
    let comment = state.services.comments.create(&user, &details, input).await?;
    state.metrics.record_event("comment_created");
    Ok((StatusCode::CREATED, Json(comment)))
}
