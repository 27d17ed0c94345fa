//! space-watch library crate.
//!
//! Watches profiles for live Spaces, archives each recording once, and
//! emails the operator when a new one lands.

pub mod config;
pub mod dedup;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod lookup;
pub mod monitor;
pub mod notification;
pub mod supervisor;
pub mod utils;

pub use error::{Error, Result};
