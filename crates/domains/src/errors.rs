//! # DomainError
//!
//! Centralized error handling for the Communiverse core.
//! Every port and service returns [`DomainResult`]; adapters translate
//! their own failures into one of these variants at the boundary.

use thiserror::Error;

/// The primary error type for all domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input rejected before any storage access
    /// (bad feed filters, out-of-range vote values, pagination bounds).
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource, membership or pending token absent.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The permission resolver denied the action.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Missing or invalid credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Resource already exists (duplicate email or username).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A slug insert lost a race against the uniqueness constraint.
    /// Services retry on this variant; it never reaches a caller.
    #[error("slug `{0}` is already taken")]
    SlugTaken(String),

    /// A required role name missing from the role table (server misconfiguration).
    #[error("role `{0}` is not defined")]
    UnknownRole(String),

    /// A storage call exceeded the request-scoped timeout.
    #[error("storage operation timed out")]
    Timeout,

    /// Infrastructure failure (connection lost, unexpected constraint, codec error).
    #[error("internal service error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True for failures whose detail must not be shown to a client.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Internal(_) | Self::Timeout | Self::UnknownRole(_) | Self::SlugTaken(_)
        )
    }
}

/// A specialized Result type for Communiverse logic.
pub type DomainResult<T> = std::result::Result<T, DomainError>;
