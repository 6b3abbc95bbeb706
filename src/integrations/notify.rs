//! Notification delivery: OTP mails and the new-account summary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::HTTP_CLIENT;
use crate::db::models::SubscriptionPlan;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("notification endpoint answered {0}")]
    Rejected(u16),
}

/// Summary sent after an artist account is activated.
#[derive(Debug, Clone, Serialize)]
pub struct SignupNotification {
    pub user_id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub plan: SubscriptionPlan,
    pub amount_paid_cents: Option<i64>,
    pub customer_id: Option<String>,
}

impl SignupNotification {
    pub fn message(&self) -> String {
        let price = self
            .amount_paid_cents
            .map(|c| format!("${}.{:02}", c / 100, c % 100))
            .unwrap_or_else(|| "n/a".to_string());
        format!(
            "New Account Created!\n\nUser ID: {}\nEmail: {}\nCreated At: {}\n\n\
             Payment Details:\nPlan: {}\nPrice Paid: {}\nCustomer ID: {}",
            self.user_id,
            self.email,
            self.created_at.to_rfc3339(),
            self.plan,
            price,
            self.customer_id.as_deref().unwrap_or("n/a"),
        )
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_otp(&self, email: &str, code: &str) -> Result<(), NotifyError>;

    /// Best-effort; callers log and swallow failures.
    async fn send_signup_notification(
        &self,
        notification: &SignupNotification,
    ) -> Result<(), NotifyError>;
}

/// Development notifier: writes deliveries to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_otp(&self, email: &str, code: &str) -> Result<(), NotifyError> {
        tracing::info!(email = %email, "verification code issued (no mail relay configured)");
        tracing::debug!(email = %email, code = %code, "verification code");
        Ok(())
    }

    async fn send_signup_notification(
        &self,
        notification: &SignupNotification,
    ) -> Result<(), NotifyError> {
        tracing::info!(
            user_id = %notification.user_id,
            email = %notification.email,
            plan = %notification.plan,
            "new artist account"
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TelegramTarget {
    pub bot_token: String,
    pub chat_id: String,
}

/// Delivers OTP mails through an HTTP mail relay and signup summaries to a
/// Telegram chat.
pub struct HttpNotifier {
    mail_relay_url: String,
    telegram: Option<TelegramTarget>,
}

#[derive(Serialize)]
struct RelayMail<'a> {
    to: &'a str,
    subject: &'a str,
    text: String,
}

#[derive(Serialize)]
struct TelegramMessage<'a> {
    chat_id: &'a str,
    text: String,
}

impl HttpNotifier {
    pub fn new(mail_relay_url: impl Into<String>, telegram: Option<TelegramTarget>) -> Self {
        Self {
            mail_relay_url: mail_relay_url.into(),
            telegram,
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send_otp(&self, email: &str, code: &str) -> Result<(), NotifyError> {
        let mail = RelayMail {
            to: email,
            subject: "Verify your email address - ArtisansHub",
            text: format!(
                "Your verification code is: {}\n\nPlease enter this code to verify your account.",
                code
            ),
        };
        let response = HTTP_CLIENT
            .post(&self.mail_relay_url)
            .json(&mail)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }
        tracing::info!(email = %email, "verification code sent");
        Ok(())
    }

    async fn send_signup_notification(
        &self,
        notification: &SignupNotification,
    ) -> Result<(), NotifyError> {
        let Some(target) = &self.telegram else {
            tracing::debug!("Telegram not configured, skipping signup notification");
            return Ok(());
        };
        let response = HTTP_CLIENT
            .post(format!(
                "https://api.telegram.org/bot{}/sendMessage",
                target.bot_token
            ))
            .json(&TelegramMessage {
                chat_id: &target.chat_id,
                text: notification.message(),
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}
