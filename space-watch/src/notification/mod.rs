//! Operator notifications.
//!
//! A [`Notifier`] receives one [`RecordingNotice`] per newly archived
//! recording. [`EmailNotifier`] delivers it over SMTP.

mod email;

pub use email::{EmailConfig, EmailNotifier};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::Result;

/// A recording that was just archived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingNotice {
    pub username: String,
    pub title: String,
    pub space_url: String,
    pub timestamp: DateTime<Utc>,
}

impl RecordingNotice {
    pub fn new(
        username: impl Into<String>,
        title: impl Into<String>,
        space_url: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            title: title.into(),
            space_url: space_url.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn subject(&self) -> String {
        format!("New Space recorded: @{}", self.username)
    }

    pub fn body(&self) -> String {
        format!(
            "A new Space was recorded from @{}:\n\nTitle: {}",
            self.username, self.title
        )
    }
}

/// Delivers notices to the operator.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// Channel type name, for logs.
    fn channel_type(&self) -> &'static str;

    /// Whether notices are actually delivered. A disabled channel accepts
    /// notices and drops them.
    fn is_enabled(&self) -> bool {
        true
    }

    async fn notify(&self, notice: &RecordingNotice) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_text() {
        let notice = RecordingNotice::new("alice", "Ep1", "https://x.com/i/spaces/a");
        assert_eq!(notice.subject(), "New Space recorded: @alice");
        assert_eq!(
            notice.body(),
            "A new Space was recorded from @alice:\n\nTitle: Ep1"
        );
    }
}
