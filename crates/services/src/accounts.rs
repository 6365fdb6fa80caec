//! # Accounts
//!
//! Registration, activation, login, password reset and profile edits. One-time tokens
//! are random UUIDs handed to the user by mail; only their SHA-256 digest
//! is stored.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use domains::{
    role_names, DomainError, DomainResult, Mailer, PasswordHasher, PendingToken, PublicProfile,
    TokenIssuer, TokenPurpose, User, UserRepository,
};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::roles::RoleCatalog;
use crate::validate;

#[derive(Debug, Clone)]
pub struct AccountSettings {
    pub invitation_ttl: TimeDelta,
    pub reset_ttl: TimeDelta,
    /// Base URL of the web client; links in mails point there.
    pub frontend_url: String,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            invitation_ttl: TimeDelta::days(3),
            reset_ttl: TimeDelta::minutes(45),
            frontend_url: "http://localhost:5173".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterInput {
    #[validate(length(min = 3, max = 100, message = "name must be 3 to 100 characters"))]
    pub name: String,
    #[validate(length(min = 3, max = 32, message = "username must be 3 to 32 characters"))]
    pub username: String,
    #[validate(email(message = "email is not valid"), length(max = 255))]
    pub email: String,
    #[validate(length(min = 8, max = 72, message = "password must be 8 to 72 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginInput {
    #[validate(email(message = "email is not valid"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ForgotPasswordInput {
    #[validate(email(message = "email is not valid"))]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ResetPasswordInput {
    #[validate(length(min = 1, message = "token is required"))]
    pub token: String,
    #[validate(length(min = 8, max = 72, message = "password must be 8 to 72 characters"))]
    pub password: String,
}

/// Fields left out keep their current value.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProfileChanges {
    #[validate(length(min = 3, max = 100, message = "name must be 3 to 100 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 3, max = 32, message = "username must be 3 to 32 characters"))]
    pub username: Option<String>,
    #[validate(length(min = 8, max = 100, message = "bio must be 8 to 100 characters"))]
    pub bio: Option<String>,
}

/// Hex SHA-256 of a one-time token, as stored.
pub fn hash_token(plain: &str) -> String {
    hex::encode(Sha256::digest(plain.as_bytes()))
}

fn one_time_token() -> (String, String) {
    let plain = Uuid::new_v4().to_string();
    let hash = hash_token(&plain);
    (plain, hash)
}

#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserRepository>,
    roles: Arc<RoleCatalog>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: Arc<dyn TokenIssuer>,
    mailer: Arc<dyn Mailer>,
    settings: AccountSettings,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        roles: Arc<RoleCatalog>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: Arc<dyn TokenIssuer>,
        mailer: Arc<dyn Mailer>,
        settings: AccountSettings,
    ) -> Self {
        Self {
            users,
            roles,
            hasher,
            tokens,
            mailer,
            settings,
        }
    }

    /// Creates an inactive user and mails the activation link. If the mail
    /// cannot be sent the user is removed again.
    pub async fn register(&self, input: RegisterInput) -> DomainResult<User> {
        validate(&input)?;

        let role = self.roles.get(role_names::USER).await?;
        let password_hash = self.hasher.hash(&input.password)?;
        let now = Utc::now();
        let user = User {
            id: Uuid::now_v7(),
            name: input.name,
            username: input.username,
            email: input.email.to_lowercase(),
            bio: None,
            avatar_id: None,
            role,
            is_active: false,
            created_at: now,
        };

        let (plain, token_hash) = one_time_token();
        let invitation = PendingToken {
            user_id: user.id,
            purpose: TokenPurpose::Invitation,
            token_hash,
            expires_at: now + self.settings.invitation_ttl,
        };
        self.users
            .create_with_invitation(&user, &password_hash, &invitation)
            .await?;

        let url = format!("{}/confirm/{plain}", self.settings.frontend_url);
        if let Err(e) = self.mailer.send_invitation(&user, &url).await {
            error!(user = %user.id, error = %e, "invitation mail failed, rolling back user");
            if let Err(cleanup) = self.users.delete(user.id).await {
                error!(user = %user.id, error = %cleanup, "could not remove unactivated user");
            }
            return Err(e);
        }

        info!(user = %user.id, "user registered");
        Ok(user)
    }

    pub async fn activate(&self, plain_token: &str) -> DomainResult<()> {
        self.users
            .activate(&hash_token(plain_token), Utc::now())
            .await
            .map_err(invalid_token)
    }

    /// Returns a signed session token.
    pub async fn login(&self, input: LoginInput) -> DomainResult<String> {
        validate(&input)?;

        let Some(credentials) = self
            .users
            .find_credentials_by_email(&input.email.to_lowercase())
            .await?
        else {
            return Err(bad_credentials());
        };

        if !self.hasher.verify(&input.password, &credentials.password_hash) {
            warn!(user = %credentials.user.id, "login with wrong password");
            return Err(bad_credentials());
        }
        if !credentials.user.is_active {
            return Err(DomainError::Unauthorized(
                "account has not been activated".to_string(),
            ));
        }

        self.tokens.issue(credentials.user.id)
    }

    /// Always succeeds for a well-formed address, whether or not an account
    /// exists, so the endpoint cannot be used to probe for users.
    pub async fn forgot_password(&self, input: ForgotPasswordInput) -> DomainResult<()> {
        validate(&input)?;

        let Some(credentials) = self
            .users
            .find_credentials_by_email(&input.email.to_lowercase())
            .await?
        else {
            info!("password reset requested for unknown address");
            return Ok(());
        };

        let user = credentials.user;
        let (plain, token_hash) = one_time_token();
        self.users
            .store_token(&PendingToken {
                user_id: user.id,
                purpose: TokenPurpose::PasswordReset,
                token_hash,
                expires_at: Utc::now() + self.settings.reset_ttl,
            })
            .await?;

        let url = format!("{}/reset-password/{plain}", self.settings.frontend_url);
        if let Err(e) = self.mailer.send_password_reset(&user, &url).await {
            error!(user = %user.id, error = %e, "password reset mail failed");
        }
        Ok(())
    }

    pub async fn reset_password(&self, input: ResetPasswordInput) -> DomainResult<()> {
        validate(&input)?;
        let password_hash = self.hasher.hash(&input.password)?;
        self.users
            .reset_password(&hash_token(&input.token), &password_hash, Utc::now())
            .await
            .map_err(invalid_token)
    }

    /// Resolves a bearer token to an active user.
    pub async fn authenticate(&self, bearer: &str) -> DomainResult<User> {
        let user_id = self.tokens.verify(bearer)?;
        match self.users.find_by_id(user_id).await? {
            Some(user) if user.is_active => Ok(user),
            _ => Err(DomainError::Unauthorized("unknown or inactive user".to_string())),
        }
    }

    pub async fn profile(&self, id: Uuid) -> DomainResult<User> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or(DomainError::NotFound("user"))
    }

    /// Only active accounts are visible.
    pub async fn public_profile(&self, username: &str) -> DomainResult<PublicProfile> {
        match self.users.find_by_username(username).await? {
            Some(user) if user.is_active => Ok(user.public_profile()),
            _ => Err(DomainError::NotFound("user")),
        }
    }

    pub async fn update_profile(&self, user: &User, changes: ProfileChanges) -> DomainResult<User> {
        validate(&changes)?;

        let updated = User {
            name: changes.name.unwrap_or_else(|| user.name.clone()),
            username: changes.username.unwrap_or_else(|| user.username.clone()),
            bio: changes.bio.or_else(|| user.bio.clone()),
            ..user.clone()
        };
        self.users.update(&updated).await?;

        info!(user = %user.id, "profile updated");
        Ok(updated)
    }

    pub async fn delete_account(&self, user: &User) -> DomainResult<()> {
        self.users.delete(user.id).await?;
        info!(user = %user.id, "account deleted");
        Ok(())
    }
}

fn bad_credentials() -> DomainError {
    DomainError::Unauthorized("invalid email or password".to_string())
}

fn invalid_token(err: DomainError) -> DomainError {
    match err {
        DomainError::NotFound(_) => DomainError::validation("invalid or expired token"),
        other => other,
    }
}
