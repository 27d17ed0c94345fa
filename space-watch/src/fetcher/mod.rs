//! Recording retrieval.
//!
//! [`RecordingFetcher`] is the seam between the monitors and whatever tool
//! archives a finished Space; [`YtDlpFetcher`] drives the `yt-dlp` binary.

mod ytdlp;

pub use ytdlp::{YtDlpConfig, YtDlpFetcher};

use std::path::PathBuf;

use async_trait::async_trait;

use crate::Result;

/// What a title-only probe learned about a recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingProbe {
    /// Recording title, never empty.
    pub title: String,
    /// File the full transfer will write, when the tool reports it.
    pub output_path: Option<PathBuf>,
}

impl RecordingProbe {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            output_path: None,
        }
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }
}

/// Retrieves the recording of a finished Space.
#[async_trait]
pub trait RecordingFetcher: Send + Sync + 'static {
    /// Learn the recording's title without transferring media.
    ///
    /// `Ok(None)` means no title is obtainable (yet).
    async fn probe(&self, username: &str, space_url: &str) -> Result<Option<RecordingProbe>>;

    /// Transfer the media to storage.
    ///
    /// On failure, implementations remove whatever partial artifacts they
    /// left behind before returning the error.
    async fn fetch(&self, username: &str, space_url: &str, probe: &RecordingProbe) -> Result<()>;
}
