use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{
    DomainError, DomainResult, PendingToken, TokenPurpose, User, UserCredentials, UserRepository,
};
use sqlx::Row;
use uuid::Uuid;

use super::{ensure_affected, map_sqlx, rows, PgStore};

const USER_COLUMNS: &str = "SELECT u.id, u.name, u.username, u.email, u.bio, u.avatar_id, \
     u.is_active, u.created_at, u.password_hash, \
     r.id AS role_id, r.name AS role_name, r.level AS role_level \
     FROM users u JOIN roles r ON r.id = u.role_id";

fn purpose(p: TokenPurpose) -> &'static str {
    match p {
        TokenPurpose::Invitation => "invitation",
        TokenPurpose::PasswordReset => "password_reset",
    }
}

const INSERT_TOKEN: &str =
    "INSERT INTO user_tokens (token_hash, user_id, purpose, expires_at) VALUES ($1, $2, $3, $4)";

impl PgStore {
    /// Locks an unexpired token row and returns its user.
    async fn claim_token(
        tx: &mut sqlx::PgConnection,
        token_hash: &str,
        kind: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM user_tokens \
             WHERE token_hash = $1 AND purpose = $2 AND expires_at > $3 FOR UPDATE",
        )
        .bind(token_hash)
        .bind(purpose(kind))
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn create_with_invitation(
        &self,
        user: &User,
        password_hash: &str,
        invitation: &PendingToken,
    ) -> DomainResult<()> {
        self.run("users.create", async {
            let mut tx = self.pool.begin().await?;

            // 1. Insert the inactive user
            sqlx::query(
                "INSERT INTO users (id, name, username, email, password_hash, bio, avatar_id, role_id, is_active, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.username)
            .bind(&user.email)
            .bind(password_hash)
            .bind(&user.bio)
            .bind(&user.avatar_id)
            .bind(user.role.id)
            .bind(user.is_active)
            .bind(user.created_at)
            .execute(&mut *tx)
            .await?;

            // 2. Insert its invitation
            sqlx::query(INSERT_TOKEN)
                .bind(&invitation.token_hash)
                .bind(invitation.user_id)
                .bind(purpose(invitation.purpose))
                .bind(invitation.expires_at)
                .execute(&mut *tx)
                .await?;

            tx.commit().await
        })
        .await
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<User>> {
        let sql = format!("{USER_COLUMNS} WHERE u.id = $1");
        let row = self
            .run(
                "users.find_by_id",
                sqlx::query(&sql).bind(id).fetch_optional(&self.pool),
            )
            .await?;
        row.as_ref()
            .map(rows::user)
            .transpose()
            .map_err(|e| map_sqlx("users.find_by_id", e))
    }

    async fn find_by_username(&self, username: &str) -> DomainResult<Option<User>> {
        let sql = format!("{USER_COLUMNS} WHERE u.username = $1");
        let row = self
            .run(
                "users.find_by_username",
                sqlx::query(&sql).bind(username).fetch_optional(&self.pool),
            )
            .await?;
        row.as_ref()
            .map(rows::user)
            .transpose()
            .map_err(|e| map_sqlx("users.find_by_username", e))
    }

    async fn update(&self, user: &User) -> DomainResult<()> {
        let result = self
            .run(
                "users.update",
                sqlx::query("UPDATE users SET name = $2, username = $3, bio = $4 WHERE id = $1")
                    .bind(user.id)
                    .bind(&user.name)
                    .bind(&user.username)
                    .bind(&user.bio)
                    .execute(&self.pool),
            )
            .await?;
        ensure_affected(result.rows_affected(), "user")
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        let result = self
            .run(
                "users.delete",
                sqlx::query("DELETE FROM users WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool),
            )
            .await?;
        ensure_affected(result.rows_affected(), "user")
    }

    async fn find_credentials_by_email(&self, email: &str) -> DomainResult<Option<UserCredentials>> {
        let sql = format!("{USER_COLUMNS} WHERE u.email = $1");
        let row = self
            .run(
                "users.find_by_email",
                sqlx::query(&sql).bind(email).fetch_optional(&self.pool),
            )
            .await?;
        row.map(|row| -> Result<UserCredentials, sqlx::Error> {
            Ok(UserCredentials {
                user: rows::user(&row)?,
                password_hash: row.try_get("password_hash")?,
            })
        })
        .transpose()
        .map_err(|e| map_sqlx("users.find_by_email", e))
    }

    async fn store_token(&self, token: &PendingToken) -> DomainResult<()> {
        self.run(
            "users.store_token",
            sqlx::query(INSERT_TOKEN)
                .bind(&token.token_hash)
                .bind(token.user_id)
                .bind(purpose(token.purpose))
                .bind(token.expires_at)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn activate(&self, token_hash: &str, now: DateTime<Utc>) -> DomainResult<()> {
        let activated = self
            .run("users.activate", async {
                let mut tx = self.pool.begin().await?;
                let Some(user_id) =
                    Self::claim_token(&mut tx, token_hash, TokenPurpose::Invitation, now).await?
                else {
                    return Ok(false);
                };

                sqlx::query("UPDATE users SET is_active = TRUE WHERE id = $1")
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM user_tokens WHERE user_id = $1 AND purpose = 'invitation'")
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;

                tx.commit().await?;
                Ok::<_, sqlx::Error>(true)
            })
            .await?;

        if activated {
            Ok(())
        } else {
            Err(DomainError::NotFound("invitation"))
        }
    }

    async fn reset_password(
        &self,
        token_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let reset = self
            .run("users.reset_password", async {
                let mut tx = self.pool.begin().await?;
                let Some(user_id) =
                    Self::claim_token(&mut tx, token_hash, TokenPurpose::PasswordReset, now).await?
                else {
                    return Ok(false);
                };

                sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
                    .bind(user_id)
                    .bind(password_hash)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM user_tokens WHERE user_id = $1 AND purpose = 'password_reset'")
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;

                tx.commit().await?;
                Ok::<_, sqlx::Error>(true)
            })
            .await?;

        if reset {
            Ok(())
        } else {
            Err(DomainError::NotFound("password reset"))
        }
    }
}
