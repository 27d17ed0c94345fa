//! Environment-driven configuration.
//!
//! Every key is optional. Values come from the process environment, which
//! `main` seeds from a `.env` file via `dotenvy` before loading.

use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

pub const DEFAULT_PROFILE_BASE_URL: &str = "https://twitter.com";
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// SMTP settings for the email notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    /// Relay host.
    pub host: String,
    /// Relay port (STARTTLS).
    pub port: u16,
    /// Sender address, also used as the login name.
    pub sender: Option<String>,
    /// Sender credential.
    pub password: Option<String>,
    /// Recipient address.
    pub receiver: Option<String>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SMTP_HOST.to_string(),
            port: DEFAULT_SMTP_PORT,
            sender: None,
            password: None,
            receiver: None,
        }
    }
}

/// Watcher configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Base URL profiles are resolved against.
    pub profile_base_url: String,
    /// Delay between lookups.
    pub check_interval: Duration,
    /// Handles to monitor, in configuration order.
    pub users: Vec<String>,
    pub smtp: SmtpConfig,
    /// Where recordings are written.
    pub recordings_dir: PathBuf,
    /// Where the application log and per-user logs are written.
    pub logs_dir: PathBuf,
    /// Dedup record file.
    pub dedup_path: PathBuf,
    /// Downloader binary.
    pub ytdlp_path: String,
    /// Ceiling on how long to wait for a Space to end. `None` waits forever.
    pub max_space_wait: Option<Duration>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            profile_base_url: DEFAULT_PROFILE_BASE_URL.to_string(),
            check_interval: Duration::from_secs(DEFAULT_CHECK_INTERVAL_SECS),
            users: Vec::new(),
            smtp: SmtpConfig::default(),
            recordings_dir: PathBuf::from("recordings"),
            logs_dir: PathBuf::from("logs"),
            dedup_path: PathBuf::from("downloaded.json"),
            ytdlp_path: "yt-dlp".to_string(),
            max_space_wait: None,
        }
    }
}

impl WatcherConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(base) = get("TWITTER_URL_BASE") {
            config.profile_base_url = base.trim_end_matches('/').to_string();
        }
        if let Some(secs) = get("CHECK_INTERVAL") {
            let secs: u64 = parse_number("CHECK_INTERVAL", &secs)?;
            if secs == 0 {
                return Err(Error::config("CHECK_INTERVAL must be at least 1 second"));
            }
            config.check_interval = Duration::from_secs(secs);
        }
        if let Some(users) = get("USERS") {
            config.users = parse_users(&users);
        }

        config.smtp.sender = get("EMAIL_SENDER");
        config.smtp.password = get("EMAIL_PASSWORD");
        config.smtp.receiver = get("EMAIL_RECEIVER");
        if let Some(host) = get("SMTP_SERVER") {
            config.smtp.host = host;
        }
        if let Some(port) = get("SMTP_PORT") {
            config.smtp.port = parse_number("SMTP_PORT", &port)?;
        }

        if let Some(dir) = get("RECORDINGS_DIR") {
            config.recordings_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("LOGS_DIR") {
            config.logs_dir = PathBuf::from(dir);
        }
        if let Some(path) = get("DOWNLOADED_RECORD") {
            config.dedup_path = PathBuf::from(path);
        }
        if let Some(path) = get("YTDLP_PATH") {
            config.ytdlp_path = path;
        }
        if let Some(secs) = get("MAX_SPACE_WAIT") {
            let secs: u64 = parse_number("MAX_SPACE_WAIT", &secs)?;
            config.max_space_wait = (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(config)
    }
}

/// Split a comma separated user list, dropping blanks.
pub fn parse_users(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|u| u.trim().trim_start_matches('@'))
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::config(format!("{key} must be a number, got {value:?}")))
}
