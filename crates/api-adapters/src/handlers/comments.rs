use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use domains::{Comment, VoteTarget};
use services::comments::CommentChanges;
use services::VoteTally;
use uuid::Uuid;

use super::{cast_vote, VoteBody};
use crate::error::ApiResult;
use crate::extract::{CurrentUser, JsonBody};
use crate::state::AppState;

pub async fn update(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    JsonBody(changes): JsonBody<CommentChanges>,
) -> ApiResult<Json<Comment>> {
    let comments = &state.services.comments;
    let context = comments.get(id, user.id).await?;
    Ok(Json(comments.update(&user, context, changes).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let comments = &state.services.comments;
    let context = comments.get(id, user.id).await?;
    comments.delete(&user, context).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn vote(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    JsonBody(body): JsonBody<VoteBody>,
) -> ApiResult<Json<VoteTally>> {
    let context = state.services.comments.get(id, user.id).await?;
    let tally = cast_vote(&state, user.id, VoteTarget::Comment(context.comment.id), body.value).await?;
    Ok(Json(tally))
}
