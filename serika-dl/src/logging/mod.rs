//! Subscriber installation, runtime filter changes and log file retention.
//!
//! Output goes to the console and to `serika.log` in the log directory,
//! rolled daily by `tracing_appender` into `serika.log.YYYY-MM-DD`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    reload,
    util::SubscriberInitExt,
};

use crate::utils::fs;
use crate::{Error, Result};

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_LOG_FILTER: &str = "serika_dl=info,tower_http=info";

const LOG_FILE_NAME: &str = "serika.log";
const RETENTION_DAYS: u64 = 7;
const RETENTION_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Timestamps in the server's local timezone with millisecond precision.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

pub type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Runtime handle on the installed subscriber.
pub struct LoggingConfig {
    filter: FilterHandle,
    log_dir: PathBuf,
}

impl LoggingConfig {
    fn new(filter: FilterHandle, log_dir: PathBuf) -> Self {
        Self { filter, log_dir }
    }

    /// The active filter rendered as directives.
    pub fn get_filter(&self) -> String {
        self.filter
            .with_current(ToString::to_string)
            .unwrap_or_default()
    }

    /// Swap in a new filter, e.g. `serika_dl::downloader=debug,tower_http=warn`.
    ///
    /// A directive that does not parse is rejected and the active filter is
    /// kept.
    pub fn set_filter(&self, directive: &str) -> Result<()> {
        let filter = EnvFilter::try_new(directive)
            .map_err(|e| Error::validation(format!("Invalid filter directive: {e}")))?;
        self.filter
            .reload(filter)
            .map_err(|e| Error::Other(format!("Failed to reload log filter: {e}")))?;
        info!(%directive, "Log filter changed");
        Ok(())
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Delete rotated files older than a week, now and then once a day.
    pub fn start_retention_cleanup(self: &Arc<Self>, cancel_token: CancellationToken) {
        let log_dir = self.log_dir.clone();
        tokio::spawn(async move {
            loop {
                match cleanup_old_logs(&log_dir, RETENTION_DAYS).await {
                    Ok(0) => {}
                    Ok(removed) => info!(removed, "Removed expired log files"),
                    Err(e) => warn!(dir = %log_dir.display(), error = %e, "Log cleanup failed"),
                }
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    _ = tokio::time::sleep(RETENTION_INTERVAL) => {}
                }
            }
            debug!("Log retention task stopped");
        });
    }
}

/// Date suffix of a rotated log file name, if `name` is one of ours.
fn rotated_log_date(name: &str) -> Option<NaiveDate> {
    let date = name.strip_prefix(LOG_FILE_NAME)?.strip_prefix('.')?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Remove rotated log files dated more than `days` days ago.
async fn cleanup_old_logs(log_dir: &Path, days: u64) -> std::io::Result<usize> {
    let Some(cutoff) = Local::now()
        .date_naive()
        .checked_sub_days(chrono::Days::new(days))
    else {
        return Ok(0);
    };

    let mut removed = 0;
    let mut entries = tokio::fs::read_dir(log_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(date) = name.to_str().and_then(rotated_log_date) else {
            continue;
        };
        if date >= cutoff || !entry.file_type().await?.is_file() {
            continue;
        }
        let path = entry.path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                removed += 1;
                debug!(path = %path.display(), "Removed expired log file");
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Could not remove log file"),
        }
    }
    Ok(removed)
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop, so `main` holds it
/// until exit.
pub fn init_logging(log_dir: &str) -> Result<(Arc<LoggingConfig>, WorkerGuard)> {
    let log_dir = PathBuf::from(log_dir);
    fs::ensure_dir_all_sync_with_op("creating log directory", &log_dir)?;

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, LOG_FILE_NAME));

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let (filter, handle) = reload::Layer::new(filter);

    let console = fmt::layer().with_timer(LocalTimer);
    let file = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_timer(LocalTimer);

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| Error::Other(format!("Failed to install tracing subscriber: {e}")))?;

    Ok((Arc::new(LoggingConfig::new(handle, log_dir)), guard))
}

/// Targets listed by `GET /api/logging` as filter suggestions.
pub fn available_modules() -> Vec<(&'static str, &'static str)> {
    vec![
        ("serika_dl", "Main application"),
        ("serika_dl::api", "HTTP handlers"),
        ("serika_dl::downloader", "yt-dlp supervision and progress parsing"),
        ("serika_dl::files", "File resolution and serving"),
        ("serika_dl::jobs", "Job registry and cleanup"),
        ("reqwest", "Outgoing HTTP (artwork, cookies)"),
        ("tower_http", "Request tracing"),
    ]
}

/// A `LoggingConfig` bound to a subscriber that is not installed globally.
///
/// The subscriber must outlive the config for reloads to succeed.
#[cfg(test)]
pub(crate) fn detached(
    directive: &str,
    log_dir: PathBuf,
) -> (Arc<LoggingConfig>, impl tracing::Subscriber) {
    let (filter, handle) = reload::Layer::new(EnvFilter::new(directive));
    let subscriber = tracing_subscriber::registry().with(filter);
    (Arc::new(LoggingConfig::new(handle, log_dir)), subscriber)
}
