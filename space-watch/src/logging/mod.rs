//! Logging setup and per-user log files.
//!
//! This module provides:
//! - Console + daily-rolling file output through `tracing-subscriber`
//! - Local timezone timestamps for logs
//! - [`UserLog`], the append-only `<logs>/<username>.log` record of one monitor

use std::path::{Path, PathBuf};

use chrono::Local;
use tokio::io::AsyncWriteExt;
use tracing::{Level, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::utils::{filename::sanitize_filename, fs};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "space_watch=info,reqwest=warn,lettre=warn";

/// File name prefix of the rolling application log.
const APP_LOG_PREFIX: &str = "space-watch.log";

/// Timestamp layout of per-user log lines, e.g. `Fri Oct 16 09:41:03 2026`.
const USER_LOG_TIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Custom timer that uses the local timezone via chrono.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Initialize logging.
///
/// # Returns
/// The appender's `WorkerGuard`; keep it alive for the app lifetime or
/// buffered file output is lost.
pub fn init_logging(log_dir: &Path) -> crate::Result<WorkerGuard> {
    fs::ensure_dir_all_sync_with_op("creating log directory", log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, APP_LOG_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer),
        )
        .try_init()
        .map_err(|e| {
            crate::Error::Other(format!("Failed to set global default subscriber: {}", e))
        })?;

    Ok(guard)
}

/// Append-only log of one monitored user.
///
/// Every entry is mirrored to `tracing` with a `user` field. File write
/// failures are reported through `tracing` and otherwise ignored; the
/// per-user file is never read back.
#[derive(Debug, Clone)]
pub struct UserLog {
    username: String,
    path: Option<PathBuf>,
}

impl UserLog {
    /// Log for `username` stored under `log_dir`.
    pub fn new(log_dir: &Path, username: &str) -> Self {
        let path = log_dir.join(format!("{}.log", sanitize_filename(username)));
        Self {
            username: username.to_string(),
            path: Some(path),
        }
    }

    /// Log that only goes to `tracing`.
    pub fn tracing_only(username: &str) -> Self {
        Self {
            username: username.to_string(),
            path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn info(&self, message: impl AsRef<str>) {
        self.record(Level::INFO, message.as_ref()).await;
    }

    pub async fn warn(&self, message: impl AsRef<str>) {
        self.record(Level::WARN, message.as_ref()).await;
    }

    async fn record(&self, level: Level, message: &str) {
        if level == Level::WARN {
            warn!(user = %self.username, "{}", message);
        } else {
            info!(user = %self.username, "{}", message);
        }

        let Some(path) = &self.path else {
            return;
        };

        let line = format_line(&Local::now().format(USER_LOG_TIME_FORMAT).to_string(), message);
        if let Err(e) = append_line(path, &line).await {
            warn!(user = %self.username, path = %path.display(), error = %e, "Failed to write user log");
        }
    }
}

fn format_line(timestamp: &str, message: &str) -> String {
    format!("[{timestamp}] {message}\n")
}

async fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}
