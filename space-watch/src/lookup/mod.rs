//! Live Space detection.
//!
//! [`SpaceLookup`] is the seam the monitors poll through; the production
//! implementation is [`ProfileSpaceLookup`], which scrapes the public
//! profile page.

mod profile;

pub use profile::{ProfileSpaceLookup, extract_space_url};

use async_trait::async_trait;

/// Finds a user's currently live Space.
///
/// Transient failures (network errors, unexpected responses) are reported
/// as `None`, exactly like "no Space": callers only ever see a URL or nothing.
#[async_trait]
pub trait SpaceLookup: Send + Sync + 'static {
    async fn active_space(&self, username: &str) -> Option<String>;
}
