//! `yt-dlp` based recording fetcher.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{RecordingFetcher, RecordingProbe};
use crate::utils::{filename::sanitize_filename, fs};
use crate::{Error, Result};

/// Suffixes yt-dlp uses for in-progress artifacts next to the final file.
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl"];

/// yt-dlp invocation settings.
#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    /// Path to the yt-dlp binary.
    pub binary_path: String,
    /// Directory recordings are written to.
    pub output_dir: PathBuf,
    /// Titles are truncated to this many characters in file names.
    pub title_max_chars: usize,
    /// Extra arguments appended before the URL.
    pub extra_args: Vec<String>,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            binary_path: "yt-dlp".to_string(),
            output_dir: PathBuf::from("recordings"),
            title_max_chars: 80,
            extra_args: Vec::new(),
        }
    }
}

/// Fetcher that shells out to yt-dlp.
pub struct YtDlpFetcher {
    config: YtDlpConfig,
}

impl YtDlpFetcher {
    pub fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &YtDlpConfig {
        &self.config
    }

    /// Output template, e.g. `recordings/alice_%(title).80s.%(ext)s`.
    fn output_template(&self, username: &str) -> String {
        let file = format!(
            "{}_%(title).{}s.%(ext)s",
            sanitize_filename(username),
            self.config.title_max_chars
        );
        self.config.output_dir.join(file).to_string_lossy().into_owned()
    }

    fn base_args(&self, username: &str, space_url: &str) -> Vec<String> {
        let mut args = vec![
            space_url.to_string(),
            "-o".to_string(),
            self.output_template(username),
        ];
        args.extend(self.config.extra_args.iter().cloned());
        args
    }

    /// Arguments for the title-only probe. `--print` implies simulation, so
    /// nothing is downloaded.
    pub fn build_probe_args(&self, username: &str, space_url: &str) -> Vec<String> {
        let mut args = self.base_args(username, space_url);
        args.extend(
            ["--print", "title", "--print", "filename", "--no-playlist", "--quiet"]
                .map(String::from),
        );
        args
    }

    pub fn build_fetch_args(&self, username: &str, space_url: &str) -> Vec<String> {
        let mut args = self.base_args(username, space_url);
        args.extend(["--no-playlist", "--quiet"].map(String::from));
        args
    }

    /// Parse probe stdout: first line is the title, second the planned file.
    ///
    /// An empty first line means the recording has no title; the filename
    /// line after it must not be taken for one.
    pub fn parse_probe_output(stdout: &str) -> Option<RecordingProbe> {
        let mut lines = stdout.lines().map(str::trim);
        let title = lines.next().filter(|t| !t.is_empty())?;
        let probe = RecordingProbe::new(title);
        Some(match lines.next().filter(|p| !p.is_empty()) {
            Some(path) => probe.with_output_path(path),
            None => probe,
        })
    }

    async fn run(&self, args: &[String]) -> Result<process_utils::CapturedOutput> {
        let mut cmd = process_utils::tokio_command(&self.config.binary_path);
        cmd.args(args);
        debug!(binary = %self.config.binary_path, ?args, "Running yt-dlp");

        process_utils::run_captured(&mut cmd)
            .await
            .map_err(|e| Error::fetch(format!("failed to run {}: {e}", self.config.binary_path)))
    }

    async fn discard_partial(&self, output_path: &Path) {
        let mut candidates = vec![output_path.to_path_buf()];
        for suffix in PARTIAL_SUFFIXES {
            let mut name = output_path.as_os_str().to_os_string();
            name.push(suffix);
            candidates.push(PathBuf::from(name));
        }

        for path in candidates {
            match fs::remove_file_if_exists(&path).await {
                Ok(true) => info!(path = %path.display(), "Removed partial download"),
                Ok(false) => {}
                Err(e) => warn!(error = %e, "Failed to remove partial download"),
            }
        }
    }
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self::new(YtDlpConfig::default())
    }
}

#[async_trait]
impl RecordingFetcher for YtDlpFetcher {
    async fn probe(&self, username: &str, space_url: &str) -> Result<Option<RecordingProbe>> {
        let output = self.run(&self.build_probe_args(username, space_url)).await?;

        let probe = Self::parse_probe_output(&output.stdout);
        if probe.is_none() && !output.success() {
            debug!(
                user = %username,
                status = %output.status,
                stderr = output.stderr_tail().unwrap_or_default(),
                "yt-dlp probe produced no title"
            );
        }
        Ok(probe)
    }

    async fn fetch(&self, username: &str, space_url: &str, probe: &RecordingProbe) -> Result<()> {
        fs::ensure_dir_all_with_op("creating recordings directory", &self.config.output_dir)
            .await?;

        let output = self.run(&self.build_fetch_args(username, space_url)).await?;
        if output.success() {
            return Ok(());
        }

        if let Some(path) = &probe.output_path {
            self.discard_partial(Path::new(path)).await;
        }

        Err(Error::fetch(format!(
            "yt-dlp exited with {}: {}",
            output.status,
            output.stderr_tail().unwrap_or("no error output")
        )))
    }
}
