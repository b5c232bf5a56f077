// ============================
// crates/backend-lib/src/mail.rs
// ============================
//! Alert mail dispatch.
use async_trait::async_trait;
use tracing::info;

use crate::config::MailSettings;
use crate::error::AppError;

/// Binary attached to an alert mail
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Structured alert handed to a [`MailDispatcher`]
#[derive(Debug, Clone, PartialEq)]
pub struct AlertMail {
    pub subject: String,
    /// Plain-text summary line
    pub text: String,
    /// Named values the transport may lay out however it likes
    pub body_fields: Vec<(String, String)>,
    pub attachment: Option<Attachment>,
}

/// Sends alert mails
#[async_trait]
pub trait MailDispatcher: Send + Sync {
    async fn send_alert(&self, mail: AlertMail) -> Result<(), AppError>;
}

/// Dispatcher that records alerts in the log instead of talking SMTP.
#[derive(Debug, Clone)]
pub struct LogMailer {
    from: String,
    to: String,
}

impl LogMailer {
    pub fn new(settings: &MailSettings) -> Self {
        Self {
            from: settings.from.clone(),
            to: settings.to.clone(),
        }
    }
}

#[async_trait]
impl MailDispatcher for LogMailer {
    async fn send_alert(&self, mail: AlertMail) -> Result<(), AppError> {
        info!(
            from = %self.from,
            to = %self.to,
            subject = %mail.subject,
            fields = ?mail.body_fields,
            attachment = ?mail.attachment.as_ref().map(|a| a.filename.as_str()),
            "alert mail: {}",
            mail.text
        );
        Ok(())
    }
}
