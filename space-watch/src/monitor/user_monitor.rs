//! UserMonitor implementation.
//!
//! A UserMonitor owns the polling loop of a single user. It looks for a
//! live Space, waits for it to end, retrieves the recording once per
//! (user, title), records it in the shared dedup store and notifies the
//! operator.
//!
//! Every failure stays inside the cycle that produced it: the monitor
//! logs it, returns to `Idle` and keeps polling. Only cancellation ends
//! the loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::events::{MonitorEvent, MonitorEventBroadcaster};
use super::state::{CycleOutcome, MonitorState};
use crate::Result;
use crate::config::WatcherConfig;
use crate::dedup::{DedupKey, DedupStore};
use crate::fetcher::RecordingFetcher;
use crate::logging::UserLog;
use crate::lookup::SpaceLookup;
use crate::notification::{Notifier, RecordingNotice};

/// Timing for a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Delay between lookups, both while idle and while waiting for the end.
    pub check_interval: Duration,
    /// Give up waiting for the end after this long and try the download
    /// anyway. `None` waits as long as the Space stays live.
    pub max_space_wait: Option<Duration>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            max_space_wait: None,
        }
    }
}

impl From<&WatcherConfig> for MonitorConfig {
    fn from(config: &WatcherConfig) -> Self {
        Self {
            check_interval: config.check_interval,
            max_space_wait: config.max_space_wait,
        }
    }
}

/// Everything monitors share. Cloning is cheap.
pub struct MonitorContext<L, F, N> {
    pub lookup: Arc<L>,
    pub fetcher: Arc<F>,
    pub notifier: Arc<N>,
    pub dedup: Arc<DedupStore>,
    pub events: MonitorEventBroadcaster,
    pub config: MonitorConfig,
    /// Directory for per-user log files; `None` logs through `tracing` only.
    pub log_dir: Option<PathBuf>,
}

impl<L, F, N> MonitorContext<L, F, N> {
    pub fn new(
        lookup: Arc<L>,
        fetcher: Arc<F>,
        notifier: Arc<N>,
        dedup: Arc<DedupStore>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            lookup,
            fetcher,
            notifier,
            dedup,
            events: MonitorEventBroadcaster::new(),
            config,
            log_dir: None,
        }
    }

    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(log_dir.into());
        self
    }

    pub fn with_events(mut self, events: MonitorEventBroadcaster) -> Self {
        self.events = events;
        self
    }
}

impl<L, F, N> Clone for MonitorContext<L, F, N> {
    fn clone(&self) -> Self {
        Self {
            lookup: self.lookup.clone(),
            fetcher: self.fetcher.clone(),
            notifier: self.notifier.clone(),
            dedup: self.dedup.clone(),
            events: self.events.clone(),
            config: self.config,
            log_dir: self.log_dir.clone(),
        }
    }
}

/// Polling state machine for one user.
pub struct UserMonitor<L, F, N> {
    username: String,
    ctx: MonitorContext<L, F, N>,
    log: UserLog,
    state: watch::Sender<MonitorState>,
    cancellation_token: CancellationToken,
}

impl<L, F, N> UserMonitor<L, F, N>
where
    L: SpaceLookup,
    F: RecordingFetcher,
    N: Notifier,
{
    pub fn new(
        username: impl Into<String>,
        ctx: MonitorContext<L, F, N>,
        cancellation_token: CancellationToken,
    ) -> Self {
        let username = username.into();
        let log = match &ctx.log_dir {
            Some(dir) => UserLog::new(dir, &username),
            None => UserLog::tracing_only(&username),
        };
        let (state, _) = watch::channel(MonitorState::Idle);

        Self {
            username,
            ctx,
            log,
            state,
            cancellation_token,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    /// Watch the monitor's state.
    pub fn subscribe_state(&self) -> watch::Receiver<MonitorState> {
        self.state.subscribe()
    }

    /// Run cycles until cancelled.
    ///
    /// Cancellation is honored at every suspension point; an in-flight
    /// lookup or transfer is dropped, which also kills its child process.
    pub async fn run(self) {
        self.log.info("Monitoring user...").await;

        loop {
            tokio::select! {
                _ = self.cancellation_token.cancelled() => break,
                outcome = self.run_cycle() => {
                    if let Some(outcome) = outcome {
                        debug!(user = %self.username, ?outcome, "Monitor cycle finished");
                    }
                }
            }

            tokio::select! {
                _ = self.cancellation_token.cancelled() => break,
                _ = tokio::time::sleep(self.ctx.config.check_interval) => {}
            }
        }

        self.set_state(MonitorState::Idle);
        self.log.info("Monitoring stopped.").await;
    }

    /// One idle tick.
    ///
    /// Returns `None` when no Space is live. Otherwise waits for the Space to
    /// end, runs the download phase and returns its outcome; the monitor is
    /// back in `Idle` either way.
    pub async fn run_cycle(&self) -> Option<CycleOutcome> {
        self.set_state(MonitorState::Idle);

        let space_url = self.ctx.lookup.active_space(&self.username).await?;
        self.set_state(MonitorState::BroadcastActive);
        self.log.info(format!("Space detected: {space_url}")).await;

        let space_url = self.await_end(space_url).await;

        self.set_state(MonitorState::Downloading);
        let outcome = self.download(&space_url).await;
        self.set_state(MonitorState::Idle);

        self.ctx.events.publish(MonitorEvent::CycleCompleted {
            username: self.username.clone(),
            space_url,
            outcome: outcome.clone(),
            timestamp: Utc::now(),
        });

        Some(outcome)
    }

    /// Poll until the Space is gone and return the last URL seen for it.
    async fn await_end(&self, mut space_url: String) -> String {
        self.set_state(MonitorState::AwaitingEnd);
        self.log.info("Waiting for Space to end...").await;

        let started = Instant::now();
        while let Some(url) = self.ctx.lookup.active_space(&self.username).await {
            space_url = url;

            if let Some(max_wait) = self.ctx.config.max_space_wait {
                if started.elapsed() >= max_wait {
                    self.log
                        .warn(format!(
                            "Space still live after {}s; trying the download anyway",
                            max_wait.as_secs()
                        ))
                        .await;
                    return space_url;
                }
            }

            tokio::time::sleep(self.ctx.config.check_interval).await;
        }

        self.log.info("Space ended.").await;
        space_url
    }

    /// The download phase: probe, dedup check, transfer, record, notify.
    ///
    /// Never fails; errors become [`CycleOutcome::Failed`] and are logged.
    pub async fn download(&self, space_url: &str) -> CycleOutcome {
        self.log
            .info(format!("Attempting to download from {space_url}"))
            .await;

        let outcome = match self.try_download(space_url).await {
            Ok(outcome) => outcome,
            Err(e) => CycleOutcome::Failed {
                reason: e.to_string(),
            },
        };

        match &outcome {
            CycleOutcome::Downloaded { title } => {
                self.log.info(format!("Downloaded '{title}'")).await
            }
            CycleOutcome::AlreadyHandled { title } => {
                self.log
                    .info(format!("Already downloaded '{title}'. Skipping."))
                    .await
            }
            CycleOutcome::NoTitle => self.log.warn("Title not found. Skipping.").await,
            CycleOutcome::Failed { reason } => {
                self.log.warn(format!("Download error: {reason}")).await
            }
        }

        outcome
    }

    async fn try_download(&self, space_url: &str) -> Result<CycleOutcome> {
        let Some(probe) = self.ctx.fetcher.probe(&self.username, space_url).await? else {
            return Ok(CycleOutcome::NoTitle);
        };

        let title = probe.title.trim();
        if title.is_empty() {
            return Ok(CycleOutcome::NoTitle);
        }

        let key = DedupKey::new(&self.username, title);
        if self.ctx.dedup.contains(&key) {
            return Ok(CycleOutcome::AlreadyHandled {
                title: title.to_string(),
            });
        }

        self.ctx
            .fetcher
            .fetch(&self.username, space_url, &probe)
            .await?;

        self.ctx.dedup.insert(&key);
        self.persist_dedup().await;
        self.notify(title, space_url).await;

        Ok(CycleOutcome::Downloaded {
            title: title.to_string(),
        })
    }

    /// Persist the dedup record, retrying once. A second failure is logged
    /// and accepted; the key stays recorded in memory.
    async fn persist_dedup(&self) {
        let Err(first) = self.ctx.dedup.persist().await else {
            return;
        };
        self.log
            .warn(format!("Failed to save download record, retrying: {first}"))
            .await;

        if let Err(e) = self.ctx.dedup.persist().await {
            self.log
                .warn(format!(
                    "Failed to save download record; it may be downloaded again after a restart: {e}"
                ))
                .await;
        }
    }

    async fn notify(&self, title: &str, space_url: &str) {
        if !self.ctx.notifier.is_enabled() {
            self.log
                .info(format!(
                    "{} notifications disabled; not sent: {title}",
                    self.ctx.notifier.channel_type()
                ))
                .await;
            return;
        }

        let notice = RecordingNotice::new(&self.username, title, space_url);
        match self.ctx.notifier.notify(&notice).await {
            Ok(()) => {
                self.log
                    .info(format!(
                        "Notification sent via {}: {title}",
                        self.ctx.notifier.channel_type()
                    ))
                    .await
            }
            Err(e) => {
                self.log
                    .warn(format!(
                        "{} notification error: {e}",
                        self.ctx.notifier.channel_type()
                    ))
                    .await
            }
        }
    }

    fn set_state(&self, next: MonitorState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });

        if changed {
            debug!(user = %self.username, state = %next, "Monitor state changed");
            self.ctx.events.publish(MonitorEvent::StateChanged {
                username: self.username.clone(),
                state: next,
                timestamp: Utc::now(),
            });
        }
    }
}
