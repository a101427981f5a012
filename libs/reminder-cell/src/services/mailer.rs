use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, error, info};

use shared_config::AppConfig;

use crate::ReminderError;

/// One-way delivery of a rendered message.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), ReminderError>;
}

/// Posts messages to a transactional mail API as JSON with a bearer key.
pub struct HttpMailer {
    client: Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl std::fmt::Debug for HttpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMailer")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("from", &self.from)
            .finish()
    }
}

impl HttpMailer {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into(),
            api_key: api_key.into(),
            from: from.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ReminderError> {
        match (&config.mail_api_url, &config.mail_api_key) {
            (Some(url), Some(key)) => Ok(Self::new(url.clone(), key.clone(), config.mail_from.clone())),
            _ => Err(ReminderError::MailerNotConfigured),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), ReminderError> {
        debug!("Sending mail to {} via {}", recipient, self.api_url);

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": recipient,
                "subject": subject,
                "text": body,
            }))
            .send()
            .await
            .map_err(|e| ReminderError::DeliveryError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Mail API error ({}): {}", status, error_text);
            return Err(ReminderError::DeliveryError(format!("{}: {}", status, error_text)));
        }

        Ok(())
    }
}

/// Used when no mail API is configured; the reminder only reaches the log.
#[derive(Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), ReminderError> {
        info!("Reminder for {} [{}]: {}", recipient, subject, body);
        Ok(())
    }
}
