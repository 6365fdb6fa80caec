use async_trait::async_trait;
use domains::{DomainResult, Mailer, User};
use tracing::info;

/// Writes account emails to the log instead of delivering them.
/// Suitable for local development and tests.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_invitation(&self, user: &User, activation_url: &str) -> DomainResult<()> {
        info!(
            user_id = %user.id,
            to = %user.email,
            url = activation_url,
            "invitation email"
        );
        Ok(())
    }

    async fn send_password_reset(&self, user: &User, reset_url: &str) -> DomainResult<()> {
        info!(
            user_id = %user.id,
            to = %user.email,
            url = reset_url,
            "password reset email"
        );
        Ok(())
    }
}
