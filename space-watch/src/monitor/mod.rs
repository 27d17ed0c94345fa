//! Per-user Space monitoring.
//!
//! Each [`UserMonitor`] runs its own polling loop through the states
//! `Idle → BroadcastActive → AwaitingEnd → Downloading → Idle` and shares
//! nothing with other monitors except the [`DedupStore`](crate::dedup::DedupStore).

mod events;
mod state;
mod user_monitor;

pub use events::{MonitorEvent, MonitorEventBroadcaster};
pub use state::{CycleOutcome, MonitorState};
pub use user_monitor::{MonitorConfig, MonitorContext, UserMonitor};
