use std::sync::Arc;

use axum::async_trait;
use tracing::{error, info};

/// Outbound mail collaborator. Delivery itself is out of scope for this
/// service; handlers treat sends as fire-and-forget.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Default mailer: records outbound mail in the log stream. Useful for
/// development and tests, and a stand-in until a real relay is wired up.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        info!(to = %to, subject = %subject, body_len = body.len(), "outbound mail");
        Ok(())
    }
}

pub fn confirmation_mail(base_url: &str, name: &str, token: &str) -> (String, String) {
    let link = format!(
        "{}/api/auth/confirmed_email/{}",
        base_url.trim_end_matches('/'),
        token
    );
    (
        "Confirm your email".to_string(),
        format!(
            "Hi {name},\n\nWelcome to contacthub. Please confirm your email by opening:\n{link}\n"
        ),
    )
}

pub fn reset_password_mail(base_url: &str, name: &str, token: &str) -> (String, String) {
    let link = format!("{}/reset-password?token={}", base_url.trim_end_matches('/'), token);
    (
        "Reset your password".to_string(),
        format!(
            "Hi {name},\n\nA password reset was requested for your account. \
             To choose a new password, open:\n{link}\n\nIf this wasn't you, ignore this mail.\n"
        ),
    )
}

/// Fire-and-forget send. Mailer failures are logged and never surfaced to
/// the request that triggered them.
pub fn spawn_send(mailer: Arc<dyn Mailer>, to: String, subject: String, body: String) {
    tokio::spawn(async move {
        if let Err(e) = mailer.send(&to, &subject, &body).await {
            error!(error = %e, to = %to, "mail send failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_mail_embeds_link() {
        let (subject, body) = confirmation_mail("http://localhost:8080/", "Alice", "tok123");
        assert_eq!(subject, "Confirm your email");
        assert!(body.contains("http://localhost:8080/api/auth/confirmed_email/tok123"));
        assert!(body.contains("Alice"));
    }

    #[test]
    fn reset_mail_embeds_token() {
        let (_, body) = reset_password_mail("http://localhost:8080", "Bob", "tok456");
        assert!(body.contains("token=tok456"));
    }
}
