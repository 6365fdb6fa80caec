//! # auth-adapters
//!
//! Credential and notification adapters for the `domains` ports:
//!
//! - [`Argon2PasswordHasher`]: `PasswordHasher` over Argon2id PHC strings.
//! - [`JwtTokenIssuer`]: HS256 session tokens (feature `auth-jwt`).
//! - [`LogMailer`]: a `Mailer` that writes outbound links to the log.

mod mailer;
mod password;

#[cfg(feature = "auth-jwt")]
mod jwt;

pub use mailer::LogMailer;
pub use password::Argon2PasswordHasher;

#[cfg(feature = "auth-jwt")]
pub use jwt::{JwtSettings, JwtTokenIssuer};
