//! # ApiError
//!
//! Maps domain failures to HTTP. Every error body is
//! `{ "error": <message>, "code": <machine code> }`; internal failures are
//! logged with their detail and answered with a generic message.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use domains::DomainError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("missing or malformed bearer token")]
    MissingToken,

    #[error("invalid request body: {0}")]
    Body(String),

    #[error("could not render metrics")]
    Metrics,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Body(rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Domain(err) => match err {
                DomainError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
                DomainError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                DomainError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
                DomainError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
                DomainError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
                DomainError::SlugTaken(_)
                | DomainError::UnknownRole(_)
                | DomainError::Timeout
                | DomainError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            },
            Self::MissingToken => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Self::Body(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            Self::Metrics => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }

    fn is_internal(&self) -> bool {
        match self {
            Self::Domain(err) => err.is_internal(),
            Self::Metrics => true,
            Self::MissingToken | Self::Body(_) => false,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = if self.is_internal() {
            error!(error = %self, "request failed");
            "internal server error".to_string()
        } else {
            if status == StatusCode::FORBIDDEN {
                warn!(error = %self, "request denied");
            }
            self.to_string()
        };

        (status, Json(ErrorBody { error: message, code })).into_response()
    }
}
