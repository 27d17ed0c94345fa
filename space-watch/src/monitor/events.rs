//! Monitor events.
//!
//! Monitors publish their state transitions and cycle results here. Nothing
//! in the watcher depends on a subscriber being present.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::state::{CycleOutcome, MonitorState};

/// Events emitted by user monitors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MonitorEvent {
    /// Monitor entered a new state.
    StateChanged {
        username: String,
        state: MonitorState,
        timestamp: DateTime<Utc>,
    },
    /// A `Downloading` phase finished.
    CycleCompleted {
        username: String,
        space_url: String,
        outcome: CycleOutcome,
        timestamp: DateTime<Utc>,
    },
}

impl MonitorEvent {
    pub fn username(&self) -> &str {
        match self {
            Self::StateChanged { username, .. } | Self::CycleCompleted { username, .. } => username,
        }
    }
}

/// Broadcaster for monitor events.
#[derive(Debug, Clone)]
pub struct MonitorEventBroadcaster {
    sender: broadcast::Sender<MonitorEvent>,
}

impl MonitorEventBroadcaster {
    /// Create a new broadcaster with default capacity (256).
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: MonitorEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for MonitorEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
