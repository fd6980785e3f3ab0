//! Eviction of expired jobs.
//!
//! Terminal jobs carry an `expires_at` timestamp. A periodic sweep removes
//! them from the registry and then deletes their Output Directory and
//! per-job cookie file.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::registry::JobRegistry;
use crate::config::DownloaderConfig;
use crate::utils::fs::{remove_dir_best_effort, remove_file_best_effort};

pub struct JobJanitor {
    registry: Arc<JobRegistry>,
    config: DownloaderConfig,
}

impl JobJanitor {
    pub fn new(registry: Arc<JobRegistry>, config: DownloaderConfig) -> Self {
        Self { registry, config }
    }

    /// Evict every job due at `now`. Returns the number of evicted jobs.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let expired = self.registry.take_expired(now);
        for job in &expired {
            let dir_removed = remove_dir_best_effort(&self.config.job_dir(&job.id)).await;
            remove_file_best_effort(&self.config.job_cookie_file(&job.id)).await;
            debug!(
                job_id = %job.id,
                status = %job.status,
                dir_removed,
                "Evicted expired job"
            );
        }
        expired.len()
    }

    /// Run [`sweep`](Self::sweep) every `sweep_interval` until cancelled.
    pub fn start(self, cancel_token: CancellationToken) -> JoinHandle<()> {
        let interval = self.config.sweep_interval;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Job janitor shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        let evicted = self.sweep(Utc::now()).await;
                        if evicted > 0 {
                            info!(evicted, remaining = self.registry.len(), "Swept expired jobs");
                        }
                    }
                }
            }
        })
    }
}
