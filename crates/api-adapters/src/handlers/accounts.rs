use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use domains::{CommunityOverview, FeedScope, Paginated, PostSummary, PublicProfile, User};
use serde::{Deserialize, Serialize};
use services::accounts::{
    ForgotPasswordInput, LoginInput, ProfileChanges, RegisterInput, ResetPasswordInput,
};
use services::{FeedParams, ListParams};

use crate::error::ApiResult;
use crate::extract::{CurrentUser, JsonBody};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct NewPassword {
    pub password: String,
}

pub async fn register(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<RegisterInput>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let user = state.services.accounts.register(input).await?;
    state.metrics.record_event("user_registered");
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<LoginInput>,
) -> ApiResult<Json<TokenResponse>> {
    let token = state.services.accounts.login(input).await?;
    Ok(Json(TokenResponse { token }))
}

/// Answers 204 whether or not the address belongs to an account.
pub async fn forgot_password(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<ForgotPasswordInput>,
) -> ApiResult<StatusCode> {
    state.services.accounts.forgot_password(input).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    JsonBody(body): JsonBody<NewPassword>,
) -> ApiResult<StatusCode> {
    state
        .services
        .accounts
        .reset_password(ResetPasswordInput {
            token,
            password: body.password,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn activate(State(state): State<AppState>, Path(token): Path<String>) -> ApiResult<StatusCode> {
    state.services.accounts.activate(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(changes): JsonBody<ProfileChanges>,
) -> ApiResult<Json<User>> {
    let user = state.services.accounts.update_profile(&user, changes).await?;
    Ok(Json(user))
}

pub async fn profile(
    State(state): State<AppState>,
    _viewer: CurrentUser,
    Path(username): Path<String>,
) -> ApiResult<Json<PublicProfile>> {
    Ok(Json(state.services.accounts.public_profile(&username).await?))
}

pub async fn delete_me(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<StatusCode> {
    state.services.accounts.delete_account(&user).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Posts from every community the viewer has joined.
pub async fn feed(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<FeedParams>,
) -> ApiResult<Json<Paginated<PostSummary>>> {
    let query = params.into_query(FeedScope::Joined)?;
    Ok(Json(state.services.feed.fetch_posts(user.id, &query).await?))
}

pub async fn joined_communities(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<CommunityOverview>>> {
    let (_, page) = params.into_parts()?;
    Ok(Json(state.services.communities.list_joined(user.id, page).await?))
}
