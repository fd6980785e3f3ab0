//! Download job supervision.
//!
//! [`DownloadService::start`] validates a request, creates the job and its
//! Output Directory, and hands the rest to a background task that runs
//! yt-dlp, feeds both output streams to the progress parser and performs the
//! terminal transition when the process exits.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use process_utils::{describe_exit, kill_process_tree, piped_command};
use tokio::io::AsyncRead;
use tokio::process::Child;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::args::{ArgContext, build_args};
use super::artwork::ArtworkEmbedder;
use super::cookies::{CookieSite, DefaultCookies, write_job_cookies};
use super::metadata::{MetadataFetcher, TrackMetadata};
use super::options::{DownloadOptions, non_empty};
use super::output_reader::RecordReader;
use super::platform::{Platform, validate_url};
use super::progress::{EMBEDDING_FLOOR, apply_chunk};
use crate::config::DownloaderConfig;
use crate::jobs::{DownloadMode, JobId, JobPatch, JobRegistry, JobStatus};
use crate::utils::fs::{ensure_dir_all, remove_dir_best_effort};
use crate::{Error, Result};

/// How long output readers may keep draining after a shutdown kill.
const DRAIN_AFTER_KILL: Duration = Duration::from_secs(2);

/// Handle to a job accepted by [`DownloadService::start`].
#[derive(Debug)]
pub struct StartedJob {
    pub id: JobId,
    pub mode: DownloadMode,
    task: JoinHandle<()>,
}

impl StartedJob {
    /// Wait until the job reached a terminal state.
    ///
    /// Dropping the handle instead detaches the job; it keeps running.
    pub async fn finished(self) {
        if let Err(e) = self.task.await {
            error!(job_id = %self.id, error = %e, "Download task panicked");
        }
    }
}

/// Everything the background task needs to run one job.
struct JobPlan {
    id: JobId,
    mode: DownloadMode,
    url: String,
    platform: Platform,
    options: DownloadOptions,
    output_dir: PathBuf,
    cookies_file: Option<PathBuf>,
}

pub struct DownloadService {
    config: DownloaderConfig,
    registry: Arc<JobRegistry>,
    metadata: MetadataFetcher,
    artwork: ArtworkEmbedder,
    default_cookies: DefaultCookies,
    permits: Option<Arc<Semaphore>>,
    shutdown: CancellationToken,
}

impl DownloadService {
    pub fn new(config: DownloaderConfig, registry: Arc<JobRegistry>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("serika-dl/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            metadata: MetadataFetcher::new(&config.ytdlp_path, config.metadata_timeout),
            artwork: ArtworkEmbedder::new(&config.ffmpeg_path, client.clone()),
            default_cookies: DefaultCookies::new(&config, client),
            permits: config
                .max_concurrent_jobs
                .map(|max| Arc::new(Semaphore::new(max))),
            shutdown: CancellationToken::new(),
            registry,
            config,
        })
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn metadata(&self) -> &MetadataFetcher {
        &self.metadata
    }

    /// Kill running yt-dlp processes. Their jobs end in the error state.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Accept a download request.
    ///
    /// Input and setup errors are returned here and leave no job behind.
    /// Everything after that is recorded on the job.
    pub async fn start(self: &Arc<Self>, options: DownloadOptions) -> Result<StartedJob> {
        let url = validate_url(&options.url)?;
        let platform = Platform::detect(&url);

        let mut mode = options.mode();
        if platform == Platform::SpotifyTrack && mode == DownloadMode::Video {
            mode = DownloadMode::Audio;
        }

        let id = Uuid::new_v4();
        let output_dir = self.config.job_dir(&id);
        ensure_dir_all(&output_dir).await?;

        let cookies_file = match non_empty(&options.cookies) {
            Some(contents) => match write_job_cookies(&self.config, &id, contents).await {
                Ok(path) => Some(path),
                Err(e) => {
                    remove_dir_best_effort(&output_dir).await;
                    return Err(e);
                }
            },
            None => None,
        };

        self.registry.create(id, mode);
        info!(job_id = %id, %mode, url = %url, "Download accepted");

        let plan = JobPlan {
            id,
            mode,
            url,
            platform,
            options,
            output_dir,
            cookies_file,
        };
        let service = Arc::clone(self);
        let task = tokio::spawn(async move { service.run(plan).await });

        Ok(StartedJob { id, mode, task })
    }

    async fn run(&self, plan: JobPlan) {
        let id = plan.id;
        let _permit = self.acquire_permit(&id).await;

        let track = if plan.platform == Platform::SpotifyTrack {
            self.resolve_track(&id, &plan.url).await
        } else {
            None
        };

        let mut ctx = ArgContext::new(&plan.output_dir, &plan.url, plan.mode);
        if let Some(track) = &track {
            ctx.url = track.search_query();
            ctx.track = Some(track.clone());
        }
        ctx.cookies_file = match plan.cookies_file {
            Some(path) => Some(path),
            None => self.default_cookies_for(&id, &plan.url).await,
        };

        let args = build_args(&plan.options, &ctx);
        debug!(job_id = %id, args = ?args, "Starting yt-dlp");

        let child = match piped_command(&self.config.ytdlp_path, &args).spawn() {
            Ok(child) => child,
            Err(e) => {
                let err = Error::spawn(self.config.ytdlp_path.display().to_string(), e);
                error!(job_id = %id, error = %err, "Failed to start yt-dlp");
                self.fail(&id, err.to_string());
                return;
            }
        };

        self.registry.update(
            &id,
            JobPatch::new()
                .progress(0.0)
                .status(JobStatus::Downloading),
        );

        match self.supervise(&id, child).await {
            Ok(Some(status)) if status.success() => {
                self.complete(&id, &plan.output_dir, track.as_ref()).await;
            }
            Ok(Some(status)) => {
                warn!(job_id = %id, exit = %describe_exit(&status), "yt-dlp failed");
                self.fail_with_exit(&id, &status);
            }
            Ok(None) => {
                warn!(job_id = %id, "Download cancelled by shutdown");
                self.fail(&id, "Download cancelled: server shutting down".to_string());
            }
            Err(e) => {
                error!(job_id = %id, error = %e, "Error waiting for yt-dlp");
                self.fail(&id, format!("Failed to wait for yt-dlp: {e}"));
            }
        }
    }

    async fn acquire_permit(&self, id: &JobId) -> Option<OwnedSemaphorePermit> {
        let permits = self.permits.as_ref()?;
        if permits.available_permits() == 0 {
            debug!(job_id = %id, "Waiting for a download slot");
        }
        // The semaphore is never closed.
        Arc::clone(permits).acquire_owned().await.ok()
    }

    async fn resolve_track(&self, id: &JobId, url: &str) -> Option<TrackMetadata> {
        match self.metadata.fetch_track_metadata(url).await {
            Ok(track) => {
                info!(job_id = %id, artist = %track.artist, title = %track.title, "Resolved track");
                Some(track)
            }
            Err(e) => {
                warn!(job_id = %id, error = %e, "Track lookup failed, using the URL directly");
                None
            }
        }
    }

    async fn default_cookies_for(&self, id: &JobId, url: &str) -> Option<PathBuf> {
        let site = CookieSite::for_url(url)?;
        match self.default_cookies.path_for(site).await {
            Ok(path) => path,
            Err(e) => {
                warn!(job_id = %id, site = site.as_str(), error = %e, "Default cookies unavailable");
                None
            }
        }
    }

    /// Pump both output streams into the job and wait for the exit status.
    ///
    /// Both readers are drained before this returns, so every line the
    /// process printed is reflected in the job before the terminal transition.
    /// After a shutdown kill the readers get [`DRAIN_AFTER_KILL`] and are then
    /// abandoned.
    async fn supervise(&self, id: &JobId, mut child: Child) -> io::Result<Option<ExitStatus>> {
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let readers = async {
            tokio::join!(
                pump(&self.registry, id, "stdout", stdout),
                pump(&self.registry, id, "stderr", stderr),
            );
        };

        let (status, ()) = tokio::join!(
            wait_or_cancel(&mut child, &self.shutdown),
            drain(readers, &self.shutdown, id),
        );
        status
    }

    async fn complete(&self, id: &JobId, output_dir: &Path, track: Option<&TrackMetadata>) {
        tokio::time::sleep(self.config.completion_grace).await;

        if let Some(artwork) = track.and_then(|t| t.artwork.as_deref()) {
            self.registry.modify(id, |job| {
                job.raise_progress(EMBEDDING_FLOOR);
                job.status = JobStatus::Processing;
            });
            if let Err(e) = self.artwork.embed(output_dir, artwork).await {
                warn!(job_id = %id, error = %e, "Artwork embedding failed");
            }
        }

        self.registry.update(
            id,
            JobPatch::new()
                .progress(100.0)
                .status(JobStatus::Completed)
                .clear_transfer_stats(),
        );
        self.registry.expire_after(id, self.config.success_retention);
        info!(job_id = %id, "Download completed");
    }

    /// Non-zero exit: keep the message yt-dlp printed, if any.
    fn fail_with_exit(&self, id: &JobId, status: &ExitStatus) {
        let fallback = format!("Download failed with {}", describe_exit(status));
        self.registry.modify(id, |job| {
            job.status = JobStatus::Error;
            if job.error.is_none() {
                job.error = Some(fallback);
            }
        });
        self.registry.expire_after(id, self.config.failure_retention);
    }

    fn fail(&self, id: &JobId, message: String) {
        self.registry.modify(id, |job| {
            job.status = JobStatus::Error;
            job.error = Some(message);
        });
        self.registry.expire_after(id, self.config.failure_retention);
    }
}

async fn wait_or_cancel(
    child: &mut Child,
    cancel: &CancellationToken,
) -> io::Result<Option<ExitStatus>> {
    tokio::select! {
        _ = cancel.cancelled() => {
            if let Err(e) = kill_process_tree(child).await {
                warn!(error = %e, "Failed to kill yt-dlp");
            }
            Ok(None)
        }
        status = child.wait() => status.map(Some),
    }
}

async fn drain(readers: impl Future<Output = ()>, cancel: &CancellationToken, id: &JobId) {
    let mut readers = pin!(readers);
    let give_up = async {
        cancel.cancelled().await;
        tokio::time::sleep(DRAIN_AFTER_KILL).await;
    };
    tokio::select! {
        () = &mut readers => {}
        () = give_up => {
            warn!(job_id = %id, "yt-dlp output still open after kill, abandoning readers");
        }
    }
}

async fn pump<R>(registry: &JobRegistry, id: &JobId, stream: &'static str, reader: Option<R>)
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };
    let mut records = RecordReader::new(reader);
    loop {
        match records.next_record().await {
            Ok(Some(record)) => {
                trace!(job_id = %id, stream, "{record}");
                registry.modify(id, |job| apply_chunk(job, &record));
            }
            Ok(None) => break,
            Err(e) => {
                warn!(job_id = %id, stream, error = %e, "Failed to read yt-dlp output");
                break;
            }
        }
    }
}
