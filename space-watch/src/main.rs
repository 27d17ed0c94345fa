use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use space_watch::config::WatcherConfig;
use space_watch::dedup::DedupStore;
use space_watch::fetcher::{YtDlpConfig, YtDlpFetcher};
use space_watch::logging;
use space_watch::lookup::ProfileSpaceLookup;
use space_watch::monitor::{MonitorConfig, MonitorContext};
use space_watch::notification::{EmailNotifier, Notifier};
use space_watch::supervisor::Supervisor;
use space_watch::utils::fs;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = WatcherConfig::from_env().context("invalid configuration")?;

    let _log_guard = logging::init_logging(&config.logs_dir)?;

    fs::ensure_dir_all_with_op("creating recordings directory", &config.recordings_dir).await?;
    let dedup = Arc::new(DedupStore::open(&config.dedup_path).await?);

    let lookup = Arc::new(ProfileSpaceLookup::new(&config.profile_base_url)?);
    let fetcher = Arc::new(YtDlpFetcher::new(YtDlpConfig {
        binary_path: config.ytdlp_path.clone(),
        output_dir: config.recordings_dir.clone(),
        ..Default::default()
    }));
    let notifier = Arc::new(EmailNotifier::from_smtp(&config.smtp));
    if !notifier.is_enabled() {
        warn!("EMAIL_SENDER, EMAIL_PASSWORD or EMAIL_RECEIVER unset; email notifications disabled");
    }

    let ctx = MonitorContext::new(
        lookup,
        fetcher,
        notifier,
        dedup.clone(),
        MonitorConfig::from(&config),
    )
    .with_log_dir(&config.logs_dir);

    let cancellation_token = CancellationToken::new();
    let mut supervisor = Supervisor::new(ctx, cancellation_token.clone());
    let started = supervisor.spawn_all(&config.users);
    if started == 0 {
        warn!("No users configured; set USERS to a comma separated list of handles");
        return Ok(());
    }

    info!(
        users = started,
        interval_secs = config.check_interval.as_secs(),
        known_recordings = dedup.len(),
        "space-watch started"
    );

    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown requested; stopping monitors");
        cancellation_token.cancel();
    });

    let report = supervisor.run().await;
    if !report.panicked.is_empty() {
        warn!(users = ?report.panicked, "Some monitors ended abnormally");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
