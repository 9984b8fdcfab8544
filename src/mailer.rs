use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use crate::users::model::User;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Outgoing mail delivery.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> anyhow::Result<()>;
}

pub fn password_reset(user: &User, reset_url: &str, valid_minutes: i64) -> Email {
    Email {
        to: user.email.clone(),
        subject: format!("Your password reset token (valid for {valid_minutes} min)"),
        body: format!(
            "Hi {},\n\nForgot your password? Submit a PATCH request with your new password \
             and passwordConfirm to: {reset_url}\n\nIf you didn't forget your password, \
             please ignore this email.",
            user.name
        ),
    }
}

/// Logs the envelope of each message instead of delivering it. Bodies may
/// carry reset links and are never written out.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> anyhow::Result<()> {
        info!(to = %email.to, subject = %email.subject, "email");
        Ok(())
    }
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct OutboxMailer {
    sent: Mutex<Vec<Email>>,
}

impl OutboxMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<Email> {
        self.sent().pop()
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, email: Email) -> anyhow::Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("outbox poisoned"))?
            .push(email);
        Ok(())
    }
}
