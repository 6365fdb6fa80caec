use std::time::Duration;

use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, comments, communities, posts, system};
use crate::middleware::{cors_policy, track_requests};
use crate::state::AppState;

/// Builds the `/v1` API. Requests running longer than `request_timeout`
/// are answered with 408.
pub fn router(state: AppState, cors_origin: &str, request_timeout: Duration) -> Router {
    let v1 = Router::new()
        // System
        .route("/health", get(system::health))
        .route("/metrics", get(system::metrics))
        // Accounts
        .route("/auth/register", post(accounts::register))
        .route("/auth/login", post(accounts::login))
        .route("/auth/forgot-password", post(accounts::forgot_password))
        .route("/auth/reset-password/{token}", put(accounts::reset_password))
        .route("/users/activate/{token}", put(accounts::activate))
        .route("/users", patch(accounts::update_me).delete(accounts::delete_me))
        .route("/users/me", get(accounts::me))
        .route("/users/feed", get(accounts::feed))
        .route("/users/communities", get(accounts::joined_communities))
        .route("/users/{username}", get(accounts::profile))
        // Communities
        .route("/communities", get(communities::list).post(communities::create))
        .route(
            "/communities/{slug}",
            get(communities::get)
                .patch(communities::update)
                .delete(communities::delete),
        )
        .route("/communities/{slug}/join", post(communities::join))
        .route("/communities/{slug}/leave", delete(communities::leave))
        .route(
            "/communities/{slug}/posts",
            get(communities::feed).post(communities::create_post),
        )
        // Posts
        .route("/posts", get(posts::feed))
        .route(
            "/posts/{slug}",
            get(posts::get).patch(posts::update).delete(posts::delete),
        )
        .route("/posts/{slug}/vote", put(posts::vote))
        .route("/posts/{slug}/comments", post(posts::comment))
        // Comments
        .route("/comments/{id}", patch(comments::update).delete(comments::delete))
        .route("/comments/{id}/vote", put(comments::vote))
        .route_layer(from_fn_with_state(state.clone(), track_requests));

    Router::new()
        .nest("/v1", v1)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TimeoutLayer::new(request_timeout))
                .layer(cors_policy(cors_origin)),
        )
        .with_state(state)
}
