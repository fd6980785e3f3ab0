use std::sync::Arc;

use anyhow::Context;
use serika_dl::api::{ApiServer, AppState};
use serika_dl::config::{AppConfig, log_dir_from_env};
use serika_dl::downloader::DownloadService;
use serika_dl::jobs::{JobJanitor, JobRegistry};
use serika_dl::logging::init_logging;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let (logging, _log_guard) =
        init_logging(&log_dir_from_env()).context("Failed to initialize logging")?;
    let config = AppConfig::from_env_or_default();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        jobs_root = %config.downloader.jobs_root.display(),
        ytdlp = %config.downloader.ytdlp_path.display(),
        ffmpeg = %config.downloader.ffmpeg_path.display(),
        "Starting serika-dl"
    );

    let cancel = CancellationToken::new();
    logging.start_retention_cleanup(cancel.child_token());

    let registry = Arc::new(JobRegistry::new());
    let janitor =
        JobJanitor::new(registry.clone(), config.downloader.clone()).start(cancel.child_token());
    let downloads = Arc::new(
        DownloadService::new(config.downloader.clone(), registry)
            .context("Failed to create download service")?,
    );

    let state = AppState::new(downloads.clone()).with_logging(logging);
    let server = ApiServer::new(config.server.clone(), state).with_cancel_token(cancel.clone());

    {
        let cancel = cancel.clone();
        let downloads = downloads.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                return;
            }
            info!("Received Ctrl-C, shutting down");
            downloads.shutdown();
            cancel.cancel();
        });
    }

    let result = server.run().await;

    downloads.shutdown();
    cancel.cancel();
    if let Err(e) = janitor.await {
        warn!(error = %e, "Job janitor task failed");
    }

    result.context("API server failed")?;
    info!("serika-dl stopped");
    Ok(())
}
