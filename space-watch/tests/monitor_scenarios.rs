//! End-to-end monitor cycles against scripted capabilities.
//!
//! These tests drive real `UserMonitor`s and the `Supervisor` with fake
//! lookup, fetcher and notifier implementations, and a dedup record on disk.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use space_watch::dedup::{DedupKey, DedupStore};
use space_watch::fetcher::{RecordingFetcher, RecordingProbe};
use space_watch::lookup::SpaceLookup;
use space_watch::monitor::{
    CycleOutcome, MonitorConfig, MonitorContext, MonitorEvent, MonitorEventBroadcaster,
    MonitorState, UserMonitor,
};
use space_watch::notification::{Notifier, RecordingNotice};
use space_watch::supervisor::Supervisor;
use space_watch::{Error, Result};

/// Per-user scripted lookups. Once a script runs out the user is offline,
/// unless it was marked as live forever.
#[derive(Default)]
struct ScriptedLookup {
    scripts: Mutex<HashMap<String, VecDeque<Option<String>>>>,
    always_live: Mutex<HashMap<String, String>>,
}

impl ScriptedLookup {
    fn script(self, username: &str, responses: &[Option<&str>]) -> Self {
        self.scripts.lock().insert(
            username.to_string(),
            responses.iter().map(|r| r.map(str::to_string)).collect(),
        );
        self
    }

    fn live_forever(self, username: &str, url: &str) -> Self {
        self.always_live
            .lock()
            .insert(username.to_string(), url.to_string());
        self
    }
}

#[async_trait]
impl SpaceLookup for ScriptedLookup {
    async fn active_space(&self, username: &str) -> Option<String> {
        if let Some(url) = self.always_live.lock().get(username) {
            return Some(url.clone());
        }
        self.scripts
            .lock()
            .get_mut(username)
            .and_then(|script| script.pop_front())
            .flatten()
    }
}

/// Title source for the fake fetcher.
enum Titles {
    Fixed(&'static str),
    /// Last path segment of the Space URL.
    FromUrl,
}

struct FakeFetcher {
    titles: Titles,
    fail_transfer: bool,
    probes: Mutex<Vec<String>>,
    transfers: Mutex<Vec<(String, String)>>,
}

impl FakeFetcher {
    fn new(titles: Titles) -> Self {
        Self {
            titles,
            fail_transfer: false,
            probes: Mutex::new(Vec::new()),
            transfers: Mutex::new(Vec::new()),
        }
    }

    fn failing_transfer(mut self) -> Self {
        self.fail_transfer = true;
        self
    }

    fn transfer_count(&self) -> usize {
        self.transfers.lock().len()
    }
}

#[async_trait]
impl RecordingFetcher for FakeFetcher {
    async fn probe(&self, _username: &str, space_url: &str) -> Result<Option<RecordingProbe>> {
        self.probes.lock().push(space_url.to_string());
        let title = match &self.titles {
            Titles::Fixed(title) => title.to_string(),
            Titles::FromUrl => space_url.rsplit('/').next().unwrap_or_default().to_string(),
        };
        Ok(Some(RecordingProbe::new(title)))
    }

    async fn fetch(&self, username: &str, _space_url: &str, probe: &RecordingProbe) -> Result<()> {
        if self.fail_transfer {
            return Err(Error::fetch("connection reset"));
        }
        self.transfers
            .lock()
            .push((username.to_string(), probe.title.clone()));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    fail: bool,
    disabled: bool,
    attempts: Mutex<Vec<RecordingNotice>>,
}

impl RecordingNotifier {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn disabled() -> Self {
        Self {
            disabled: true,
            ..Default::default()
        }
    }

    fn attempts(&self) -> Vec<RecordingNotice> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn channel_type(&self) -> &'static str {
        "test"
    }

    fn is_enabled(&self) -> bool {
        !self.disabled
    }

    async fn notify(&self, notice: &RecordingNotice) -> Result<()> {
        self.attempts.lock().push(notice.clone());
        if self.fail {
            return Err(Error::notification("relay refused connection"));
        }
        Ok(())
    }
}

struct Harness {
    dir: tempfile::TempDir,
    lookup: Arc<ScriptedLookup>,
    fetcher: Arc<FakeFetcher>,
    notifier: Arc<RecordingNotifier>,
    dedup: Arc<DedupStore>,
    events: MonitorEventBroadcaster,
}

impl Harness {
    async fn new(lookup: ScriptedLookup, fetcher: FakeFetcher, notifier: RecordingNotifier) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let dedup = DedupStore::open(dir.path().join("downloaded.json"))
            .await
            .unwrap();
        Self {
            dir,
            lookup: Arc::new(lookup),
            fetcher: Arc::new(fetcher),
            notifier: Arc::new(notifier),
            dedup: Arc::new(dedup),
            events: MonitorEventBroadcaster::with_capacity(1024),
        }
    }

    fn ctx(&self) -> MonitorContext<ScriptedLookup, FakeFetcher, RecordingNotifier> {
        MonitorContext::new(
            self.lookup.clone(),
            self.fetcher.clone(),
            self.notifier.clone(),
            self.dedup.clone(),
            MonitorConfig {
                check_interval: Duration::from_millis(2),
                max_space_wait: None,
            },
        )
        .with_log_dir(self.dir.path().join("logs"))
        .with_events(self.events.clone())
    }

    fn monitor(
        &self,
        username: &str,
    ) -> UserMonitor<ScriptedLookup, FakeFetcher, RecordingNotifier> {
        UserMonitor::new(username, self.ctx(), CancellationToken::new())
    }
}

#[tokio::test]
async fn test_space_downloaded_recorded_and_notified() {
    let harness = Harness::new(
        ScriptedLookup::default().script("alice", &[Some("https://x.com/i/spaces/1"), None]),
        FakeFetcher::new(Titles::Fixed("Ep1")),
        RecordingNotifier::default(),
    )
    .await;

    let outcome = harness.monitor("alice").run_cycle().await;

    assert_eq!(
        outcome,
        Some(CycleOutcome::Downloaded {
            title: "Ep1".to_string()
        })
    );
    assert!(harness.dedup.contains(&DedupKey::new("alice", "Ep1")));
    assert_eq!(harness.fetcher.transfer_count(), 1);

    let notices = harness.notifier.attempts();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].body().contains("Ep1"));
    assert_eq!(notices[0].username, "alice");

    // The record on disk already has the key.
    let reloaded = DedupStore::load(harness.dedup.path().unwrap()).await.unwrap();
    assert_eq!(reloaded.record_keys(), vec!["alice|Ep1".to_string()]);

    // So does the per-user log.
    let log = tokio::fs::read_to_string(harness.dir.path().join("logs").join("alice.log"))
        .await
        .unwrap();
    assert!(log.contains("Space detected: https://x.com/i/spaces/1"));
    assert!(log.contains("Downloaded 'Ep1'"));
}

#[tokio::test]
async fn test_already_recorded_space_is_skipped() {
    let harness = Harness::new(
        ScriptedLookup::default().script("alice", &[Some("https://x.com/i/spaces/1"), None]),
        FakeFetcher::new(Titles::Fixed("Ep1")),
        RecordingNotifier::default(),
    )
    .await;
    harness.dedup.insert(&DedupKey::new("alice", "Ep1"));

    let outcome = harness.monitor("alice").run_cycle().await;

    assert_eq!(
        outcome,
        Some(CycleOutcome::AlreadyHandled {
            title: "Ep1".to_string()
        })
    );
    assert_eq!(harness.fetcher.transfer_count(), 0);
    assert!(harness.notifier.attempts().is_empty());
}

#[tokio::test]
async fn test_missing_title_abandons_cycle() {
    let harness = Harness::new(
        ScriptedLookup::default().script("alice", &[Some("https://x.com/i/spaces/1"), None]),
        FakeFetcher::new(Titles::Fixed("   ")),
        RecordingNotifier::default(),
    )
    .await;

    let monitor = harness.monitor("alice");
    let outcome = monitor.run_cycle().await;

    assert_eq!(outcome, Some(CycleOutcome::NoTitle));
    assert!(harness.dedup.is_empty());
    assert_eq!(harness.fetcher.transfer_count(), 0);
    assert!(harness.notifier.attempts().is_empty());
    assert_eq!(monitor.state(), MonitorState::Idle);
}

#[tokio::test]
async fn test_notification_failure_keeps_record() {
    let harness = Harness::new(
        ScriptedLookup::default().script(
            "alice",
            &[
                Some("https://x.com/i/spaces/1"),
                None,
                Some("https://x.com/i/spaces/1"),
                None,
            ],
        ),
        FakeFetcher::new(Titles::Fixed("Ep1")),
        RecordingNotifier::failing(),
    )
    .await;
    let monitor = harness.monitor("alice");

    let first = monitor.run_cycle().await.unwrap();
    assert!(first.is_downloaded());
    assert!(harness.dedup.contains(&DedupKey::new("alice", "Ep1")));

    let second = monitor.run_cycle().await.unwrap();
    assert_eq!(
        second,
        CycleOutcome::AlreadyHandled {
            title: "Ep1".to_string()
        }
    );
    assert_eq!(harness.fetcher.transfer_count(), 1);
    assert_eq!(harness.notifier.attempts().len(), 1);
}

#[tokio::test]
async fn test_failed_transfer_is_not_recorded() {
    let harness = Harness::new(
        ScriptedLookup::default().script("alice", &[Some("https://x.com/i/spaces/1"), None]),
        FakeFetcher::new(Titles::Fixed("Ep1")).failing_transfer(),
        RecordingNotifier::default(),
    )
    .await;

    let outcome = harness.monitor("alice").run_cycle().await.unwrap();

    assert!(matches!(outcome, CycleOutcome::Failed { ref reason } if reason.contains("connection reset")));
    assert!(harness.dedup.is_empty());
    assert!(harness.notifier.attempts().is_empty());
}

#[tokio::test]
async fn test_download_phase_is_idempotent() {
    let harness = Harness::new(
        ScriptedLookup::default(),
        FakeFetcher::new(Titles::Fixed("Ep1")),
        RecordingNotifier::default(),
    )
    .await;
    let monitor = harness.monitor("alice");

    let first = monitor.download("https://x.com/i/spaces/1").await;
    let second = monitor.download("https://x.com/i/spaces/1").await;

    assert!(first.is_downloaded());
    assert!(matches!(second, CycleOutcome::AlreadyHandled { .. }));
    assert_eq!(harness.fetcher.transfer_count(), 1);
    assert_eq!(harness.notifier.attempts().len(), 1);
}

#[tokio::test]
async fn test_each_found_then_gone_alternation_is_one_cycle() {
    let harness = Harness::new(
        ScriptedLookup::default().script(
            "alice",
            &[
                Some("https://x.com/i/spaces/first"),
                None,
                Some("https://x.com/i/spaces/second"),
                None,
            ],
        ),
        FakeFetcher::new(Titles::FromUrl),
        RecordingNotifier::default(),
    )
    .await;
    let mut events = harness.events.subscribe();
    let token = CancellationToken::new();
    let monitor = UserMonitor::new("alice", harness.ctx(), token.clone());
    let task = tokio::spawn(monitor.run());

    let mut states = Vec::new();
    let mut titles = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while titles.len() < 2 {
            match events.recv().await.unwrap() {
                MonitorEvent::StateChanged { state, .. } => states.push(state),
                MonitorEvent::CycleCompleted { outcome, .. } => {
                    titles.push(outcome.title().unwrap_or_default().to_string())
                }
            }
        }
    })
    .await
    .expect("two cycles should complete");

    token.cancel();
    task.await.unwrap();

    let one_cycle = [
        MonitorState::BroadcastActive,
        MonitorState::AwaitingEnd,
        MonitorState::Downloading,
        MonitorState::Idle,
    ];
    assert_eq!(states, [one_cycle, one_cycle].concat());
    assert_eq!(titles, ["first", "second"]);
    assert_eq!(
        *harness.fetcher.probes.lock(),
        [
            "https://x.com/i/spaces/first",
            "https://x.com/i/spaces/second"
        ]
    );
    assert_eq!(harness.notifier.attempts().len(), 2);
}

#[tokio::test]
async fn test_users_do_not_block_each_other() {
    let harness = Harness::new(
        ScriptedLookup::default()
            .live_forever("alice", "https://x.com/i/spaces/marathon")
            .script("bob", &[None, Some("https://x.com/i/spaces/bob1"), None]),
        FakeFetcher::new(Titles::FromUrl),
        RecordingNotifier::default(),
    )
    .await;
    let mut events = harness.events.subscribe();

    let mut supervisor = Supervisor::new(harness.ctx(), CancellationToken::new());
    assert_eq!(supervisor.spawn_all(["alice", "bob"]), 2);
    let token = supervisor.cancellation_token();
    let run = tokio::spawn(supervisor.run());

    let completed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let MonitorEvent::CycleCompleted {
                username, outcome, ..
            } = events.recv().await.unwrap()
            {
                return (username, outcome);
            }
        }
    })
    .await
    .expect("bob's cycle should finish while alice is still live");

    assert_eq!(completed.0, "bob");
    assert!(completed.1.is_downloaded());
    assert!(harness.dedup.contains(&DedupKey::new("bob", "bob1")));
    assert!(!harness.dedup.contains(&DedupKey::new("alice", "marathon")));

    token.cancel();
    let report = run.await.unwrap();
    assert_eq!(report.stopped, 2);
}

#[tokio::test]
async fn test_unwritable_record_still_downloads_and_notifies() {
    let mut harness = Harness::new(
        ScriptedLookup::default().script("alice", &[Some("https://x.com/i/spaces/1"), None]),
        FakeFetcher::new(Titles::Fixed("Ep1")),
        RecordingNotifier::default(),
    )
    .await;

    // Swap the record's directory for a regular file so every persist fails.
    let state_dir = harness.dir.path().join("state");
    let store = DedupStore::open(state_dir.join("downloaded.json"))
        .await
        .unwrap();
    tokio::fs::remove_dir_all(&state_dir).await.unwrap();
    tokio::fs::write(&state_dir, b"not a directory").await.unwrap();
    assert!(store.persist().await.is_err());
    harness.dedup = Arc::new(store);

    let outcome = harness.monitor("alice").run_cycle().await;

    assert_eq!(
        outcome,
        Some(CycleOutcome::Downloaded {
            title: "Ep1".to_string()
        })
    );
    assert!(harness.dedup.contains(&DedupKey::new("alice", "Ep1")));
    assert_eq!(harness.fetcher.transfer_count(), 1);
    assert_eq!(harness.notifier.attempts().len(), 1);

    let log = tokio::fs::read_to_string(harness.dir.path().join("logs").join("alice.log"))
        .await
        .unwrap();
    assert!(log.contains("Failed to save download record, retrying"));
    assert!(log.contains("may be downloaded again after a restart"));
}

#[tokio::test]
async fn test_disabled_notifier_is_not_reported_as_sent() {
    let harness = Harness::new(
        ScriptedLookup::default().script("alice", &[Some("https://x.com/i/spaces/1"), None]),
        FakeFetcher::new(Titles::Fixed("Ep1")),
        RecordingNotifier::disabled(),
    )
    .await;

    let outcome = harness.monitor("alice").run_cycle().await.unwrap();

    assert!(outcome.is_downloaded());
    assert!(harness.dedup.contains(&DedupKey::new("alice", "Ep1")));
    assert!(harness.notifier.attempts().is_empty());

    let log = tokio::fs::read_to_string(harness.dir.path().join("logs").join("alice.log"))
        .await
        .unwrap();
    assert!(log.contains("test notifications disabled; not sent: Ep1"));
    assert!(!log.contains("Notification sent"));
}
