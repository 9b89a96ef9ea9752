//! Outgoing account email.

use async_trait::async_trait;

use crate::store::ApplicationUser;

/// Sends account-related email.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_confirmation_link(&self, user: &ApplicationUser, email: &str, link: &str);
    async fn send_password_reset_link(&self, user: &ApplicationUser, email: &str, link: &str);
    async fn send_password_reset_code(&self, user: &ApplicationUser, email: &str, code: &str);
}

/// Sender for devices with no mail relay: logs instead of sending.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEmailSender;

#[async_trait]
impl EmailSender for NoOpEmailSender {
    async fn send_confirmation_link(&self, user: &ApplicationUser, email: &str, link: &str) {
        tracing::info!(user = %user.user_name, email, link, "Confirmation link not sent (no-op sender)");
    }

    async fn send_password_reset_link(&self, user: &ApplicationUser, email: &str, link: &str) {
        tracing::info!(user = %user.user_name, email, link, "Password reset link not sent (no-op sender)");
    }

    async fn send_password_reset_code(&self, user: &ApplicationUser, email: &str, _code: &str) {
        tracing::info!(user = %user.user_name, email, "Password reset code not sent (no-op sender)");
    }
}
