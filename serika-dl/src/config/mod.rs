//! Process-wide configuration.
//!
//! Everything here is read once at start-up from environment variables
//! (optionally populated from a `.env` file). Per-download options such as
//! quality, codecs, proxy or cookies arrive with each request instead.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::api::server::ApiServerConfig;
use crate::downloader::binary;
use crate::downloader::cookies::CookieSite;
use crate::jobs::JobId;

/// Default directory name for job output, created under the system temp dir.
pub const DEFAULT_JOBS_DIR_NAME: &str = "serika-downloads";

const DEFAULT_LOG_DIR: &str = "logs";

/// Settings for the job runner.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Parent directory of every job's output directory.
    pub jobs_root: PathBuf,
    /// yt-dlp executable.
    pub ytdlp_path: PathBuf,
    /// ffmpeg executable, used for artwork embedding.
    pub ffmpeg_path: PathBuf,
    /// How long a completed job stays queryable and downloadable.
    pub success_retention: Duration,
    /// How long a failed job stays queryable.
    pub failure_retention: Duration,
    /// Pause between a successful exit and the completed transition.
    pub completion_grace: Duration,
    /// Interval of the expired-job sweep.
    pub sweep_interval: Duration,
    /// Optional cap on concurrently running yt-dlp processes.
    pub max_concurrent_jobs: Option<usize>,
    /// Timeout for metadata-only yt-dlp invocations.
    pub metadata_timeout: Duration,
    /// Default cookie sources per site.
    pub cookie_sources: Vec<CookieSource>,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            jobs_root: std::env::temp_dir().join(DEFAULT_JOBS_DIR_NAME),
            ytdlp_path: PathBuf::from("yt-dlp"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            success_retention: Duration::from_secs(60 * 60),
            failure_retention: Duration::from_secs(10 * 60),
            completion_grace: Duration::from_millis(500),
            sweep_interval: Duration::from_secs(30),
            max_concurrent_jobs: None,
            metadata_timeout: Duration::from_secs(30),
            cookie_sources: Vec::new(),
        }
    }
}

impl DownloaderConfig {
    /// Output Directory of a job.
    pub fn job_dir(&self, id: &JobId) -> PathBuf {
        self.jobs_root.join(id.to_string())
    }

    /// Per-request cookie file of a job.
    pub fn job_cookie_file(&self, id: &JobId) -> PathBuf {
        self.cookies_dir().join(format!("{id}.txt"))
    }

    /// Directory holding per-job cookie files.
    ///
    /// It lives next to the job directories, never inside one, so cookies are
    /// never picked up by the file resolver.
    pub fn cookies_dir(&self) -> PathBuf {
        self.jobs_root.join(".cookies")
    }

    /// Directory caching default cookie files fetched from a URL.
    pub fn default_cookies_dir(&self) -> PathBuf {
        self.jobs_root.join(".default-cookies")
    }
}

/// Default cookies configured for one site.
///
/// A static `path` wins when the file exists; otherwise the file is fetched
/// from `url` and cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieSource {
    pub site: CookieSite,
    pub path: Option<PathBuf>,
    pub url: Option<String>,
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ApiServerConfig,
    pub downloader: DownloaderConfig,
    /// Directory for rotated log files.
    pub log_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ApiServerConfig::default(),
            downloader: DownloaderConfig::default(),
            log_dir: DEFAULT_LOG_DIR.to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `API_BIND_ADDRESS`, `API_PORT`, `SERIKA_ENABLE_CORS`
    /// - `SERIKA_DOWNLOAD_DIR`, `YTDLP_PATH`, `FFMPEG_PATH`
    /// - `SERIKA_SUCCESS_RETENTION_SECS`, `SERIKA_FAILURE_RETENTION_SECS`
    /// - `SERIKA_COMPLETION_GRACE_MS`, `SERIKA_SWEEP_INTERVAL_SECS`
    /// - `SERIKA_MAX_CONCURRENT_JOBS`, `SERIKA_METADATA_TIMEOUT_SECS`
    /// - `SERIKA_LOG_DIR`
    /// - `<SITE>_COOKIES_PATH`, `<SITE>_COOKIES_URL` for instagram and bilibili
    pub fn from_env_or_default() -> Self {
        let mut config = Self {
            server: ApiServerConfig::from_env_or_default(),
            ..Self::default()
        };

        config.log_dir = log_dir_from_env();

        let downloader = &mut config.downloader;
        if let Some(dir) = env_string("SERIKA_DOWNLOAD_DIR") {
            downloader.jobs_root = PathBuf::from(dir);
        }
        downloader.ytdlp_path = match env_string("YTDLP_PATH") {
            Some(path) => PathBuf::from(path),
            None => binary::resolve_ytdlp(),
        };
        if let Some(path) = env_string("FFMPEG_PATH") {
            downloader.ffmpeg_path = PathBuf::from(path);
        }
        if let Some(secs) = env_parse::<u64>("SERIKA_SUCCESS_RETENTION_SECS") {
            downloader.success_retention = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("SERIKA_FAILURE_RETENTION_SECS") {
            downloader.failure_retention = Duration::from_secs(secs);
        }
        if let Some(ms) = env_parse::<u64>("SERIKA_COMPLETION_GRACE_MS") {
            downloader.completion_grace = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<u64>("SERIKA_SWEEP_INTERVAL_SECS")
            && secs > 0
        {
            downloader.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(max) = env_parse::<usize>("SERIKA_MAX_CONCURRENT_JOBS")
            && max > 0
        {
            downloader.max_concurrent_jobs = Some(max);
        }
        if let Some(secs) = env_parse::<u64>("SERIKA_METADATA_TIMEOUT_SECS") {
            downloader.metadata_timeout = Duration::from_secs(secs);
        }

        downloader.cookie_sources = CookieSite::ALL
            .iter()
            .filter_map(|&site| {
                let prefix = site.env_prefix();
                let path = env_string(&format!("{prefix}_COOKIES_PATH")).map(PathBuf::from);
                let url = env_string(&format!("{prefix}_COOKIES_URL"));
                (path.is_some() || url.is_some()).then_some(CookieSource { site, path, url })
            })
            .collect();

        config
    }
}

/// `SERIKA_LOG_DIR`, or `logs`.
///
/// Separate from [`AppConfig::from_env_or_default`] so logging can be set up
/// before the rest of the configuration is read and validated.
pub fn log_dir_from_env() -> String {
    env_string("SERIKA_LOG_DIR").unwrap_or_else(|| DEFAULT_LOG_DIR.to_string())
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring invalid numeric environment value");
            None
        }
    }
}
