//! Email notification channel using SMTP.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, warn};

use super::{Notifier, RecordingNotice};
use crate::config::SmtpConfig;
use crate::utils::http_client;
use crate::{Error, Result};

/// Email channel configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailConfig {
    /// SMTP server host.
    pub smtp_host: String,
    /// SMTP server port.
    pub smtp_port: u16,
    /// Sender address; doubles as the SMTP login.
    pub from_address: String,
    /// SMTP password.
    pub smtp_password: String,
    /// Recipient address.
    pub to_address: String,
}

impl EmailConfig {
    /// Build from the SMTP settings. `None` when sender, password or
    /// recipient is missing.
    pub fn from_smtp(smtp: &SmtpConfig) -> Option<Self> {
        Some(Self {
            smtp_host: smtp.host.clone(),
            smtp_port: smtp.port,
            from_address: smtp.sender.clone()?,
            smtp_password: smtp.password.clone()?,
            to_address: smtp.receiver.clone()?,
        })
    }
}

/// Email notification channel.
///
/// Without a complete configuration the channel is disabled: notices are
/// logged and dropped.
pub struct EmailNotifier {
    config: Option<EmailConfig>,
}

impl EmailNotifier {
    pub fn new(config: Option<EmailConfig>) -> Self {
        Self { config }
    }

    pub fn from_smtp(smtp: &SmtpConfig) -> Self {
        Self::new(EmailConfig::from_smtp(smtp))
    }

    /// Build the message for `notice`.
    fn build_message(config: &EmailConfig, notice: &RecordingNotice) -> Result<Message> {
        let from: Mailbox = config
            .from_address
            .parse()
            .map_err(|e| Error::notification(format!("invalid sender address: {e}")))?;
        let to: Mailbox = config
            .to_address
            .parse()
            .map_err(|e| Error::notification(format!("invalid recipient address: {e}")))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(notice.subject())
            .header(ContentType::TEXT_PLAIN)
            .body(notice.body())
            .map_err(|e| Error::notification(format!("failed to build email: {e}")))
    }

    fn build_transport(config: &EmailConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        http_client::install_rustls_provider();

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| Error::notification(format!("invalid SMTP relay: {e}")))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.from_address.clone(),
                config.smtp_password.clone(),
            ))
            .build();
        Ok(transport)
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn channel_type(&self) -> &'static str {
        "email"
    }

    fn is_enabled(&self) -> bool {
        self.config.is_some()
    }

    async fn notify(&self, notice: &RecordingNotice) -> Result<()> {
        let Some(config) = &self.config else {
            warn!(
                user = %notice.username,
                title = %notice.title,
                "Email not configured; skipping notification"
            );
            return Ok(());
        };

        let message = Self::build_message(config, notice)?;
        let transport = Self::build_transport(config)?;

        transport
            .send(message)
            .await
            .map_err(|e| Error::notification(format!("SMTP delivery failed: {e}")))?;

        debug!(user = %notice.username, to = %config.to_address, "Email notification sent");
        Ok(())
    }
}
