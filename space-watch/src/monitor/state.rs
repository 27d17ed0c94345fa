//! Monitor states and cycle outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a monitor is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MonitorState {
    /// No live Space known; polling the profile.
    Idle,
    /// A live Space was just observed.
    BroadcastActive,
    /// Polling until the Space disappears.
    AwaitingEnd,
    /// Retrieving the recording.
    Downloading,
}

impl MonitorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::BroadcastActive => "BROADCAST_ACTIVE",
            Self::AwaitingEnd => "AWAITING_END",
            Self::Downloading => "DOWNLOADING",
        }
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one `Downloading` phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleOutcome {
    /// Recording transferred, recorded and announced.
    Downloaded { title: String },
    /// The recording was handled before; nothing was transferred.
    AlreadyHandled { title: String },
    /// The probe produced no title.
    NoTitle,
    /// Probe or transfer failed.
    Failed { reason: String },
}

impl CycleOutcome {
    pub fn is_downloaded(&self) -> bool {
        matches!(self, Self::Downloaded { .. })
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            Self::Downloaded { title } | Self::AlreadyHandled { title } => Some(title),
            Self::NoTitle | Self::Failed { .. } => None,
        }
    }
}
