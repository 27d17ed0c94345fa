//! Supervisor for the per-user monitors.
//!
//! The `Supervisor` is responsible for:
//! - Spawning one [`UserMonitor`] task per configured user
//! - Waiting for all of them via a `JoinSet`
//! - Coordinating cooperative shutdown through a shared `CancellationToken`
//!
//! Monitors never coordinate with each other. A monitor that panics is
//! reported and the rest keep running.

use std::collections::{HashMap, HashSet};

use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::fetcher::RecordingFetcher;
use crate::lookup::SpaceLookup;
use crate::monitor::{MonitorContext, UserMonitor};
use crate::notification::Notifier;

/// Summary of how the monitors ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Monitors that returned normally.
    pub stopped: usize,
    /// Users whose monitor panicked.
    pub panicked: Vec<String>,
}

/// Runs one monitor per user.
pub struct Supervisor<L, F, N> {
    ctx: MonitorContext<L, F, N>,
    cancellation_token: CancellationToken,
    tasks: JoinSet<()>,
    task_users: HashMap<Id, String>,
    users: HashSet<String>,
}

impl<L, F, N> Supervisor<L, F, N>
where
    L: SpaceLookup,
    F: RecordingFetcher,
    N: Notifier,
{
    pub fn new(ctx: MonitorContext<L, F, N>, cancellation_token: CancellationToken) -> Self {
        Self {
            ctx,
            cancellation_token,
            tasks: JoinSet::new(),
            task_users: HashMap::new(),
            users: HashSet::new(),
        }
    }

    /// Token that stops every monitor when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Number of monitors spawned so far.
    pub fn monitor_count(&self) -> usize {
        self.users.len()
    }

    pub fn is_monitoring(&self, username: &str) -> bool {
        self.users.contains(username)
    }

    /// Spawn a monitor for `username`.
    ///
    /// Blank names and users that already have a monitor are skipped;
    /// returns whether a monitor was started.
    pub fn spawn_user(&mut self, username: &str) -> bool {
        let username = username.trim();
        if username.is_empty() {
            return false;
        }
        if !self.users.insert(username.to_string()) {
            warn!(user = %username, "User listed more than once; monitoring it once");
            return false;
        }

        let monitor = UserMonitor::new(
            username,
            self.ctx.clone(),
            self.cancellation_token.child_token(),
        );
        let handle = self.tasks.spawn(monitor.run());
        self.task_users.insert(handle.id(), username.to_string());

        info!(user = %username, "Spawned user monitor");
        true
    }

    /// Spawn monitors for every user in `users`; returns how many started.
    pub fn spawn_all<I, S>(&mut self, users: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut started = 0;
        for user in users {
            if self.spawn_user(user.as_ref()) {
                started += 1;
            }
        }
        started
    }

    /// Wait until every monitor has exited.
    ///
    /// Under normal operation this only returns after the cancellation
    /// token fires.
    pub async fn run(mut self) -> ShutdownReport {
        let mut report = ShutdownReport::default();

        while let Some(result) = self.tasks.join_next_with_id().await {
            match result {
                Ok((id, ())) => {
                    self.task_users.remove(&id);
                    report.stopped += 1;
                }
                Err(e) => {
                    let user = self
                        .task_users
                        .remove(&e.id())
                        .unwrap_or_else(|| "<unknown>".to_string());
                    if e.is_panic() {
                        error!(user = %user, "User monitor panicked");
                    } else {
                        warn!(user = %user, error = %e, "User monitor aborted");
                    }
                    report.panicked.push(user);
                }
            }
        }

        info!(
            stopped = report.stopped,
            panicked = report.panicked.len(),
            "All user monitors exited"
        );
        report
    }
}
