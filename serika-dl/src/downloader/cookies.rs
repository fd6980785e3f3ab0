//! Cookie files handed to yt-dlp with `--cookies`.
//!
//! Request-supplied cookies are written to a per-job file outside the job's
//! Output Directory. Without them, Instagram and Bilibili URLs fall back to a
//! process-wide default: a static file, or a file fetched from a URL and
//! cached for a bounded time.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::platform::Platform;
use crate::config::{CookieSource, DownloaderConfig};
use crate::jobs::JobId;
use crate::utils::fs::{ensure_dir_all, write_atomically};
use crate::{Error, Result};

/// How long a fetched default cookie file is reused.
pub const DEFAULT_COOKIES_TTL: Duration = Duration::from_secs(10 * 60);

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Sites with a configurable default cookie file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CookieSite {
    Instagram,
    Bilibili,
}

impl CookieSite {
    pub const ALL: [CookieSite; 2] = [CookieSite::Instagram, CookieSite::Bilibili];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instagram => "instagram",
            Self::Bilibili => "bilibili",
        }
    }

    /// Prefix of the `<SITE>_COOKIES_PATH` / `<SITE>_COOKIES_URL` variables.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Self::Instagram => "INSTAGRAM",
            Self::Bilibili => "BILIBILI",
        }
    }

    pub fn for_url(url: &str) -> Option<Self> {
        match Platform::detect(url) {
            Platform::Instagram => Some(Self::Instagram),
            Platform::Bilibili => Some(Self::Bilibili),
            _ => None,
        }
    }
}

struct CachedCookies {
    path: PathBuf,
    source: String,
    fetched_at: Instant,
}

/// Resolves default cookie files per site.
pub struct DefaultCookies {
    sources: Vec<CookieSource>,
    cache_dir: PathBuf,
    ttl: Duration,
    client: reqwest::Client,
    cache: DashMap<CookieSite, CachedCookies>,
    // Serialises refreshes so two jobs never write the same cache file.
    refresh: Mutex<()>,
}

impl DefaultCookies {
    pub fn new(config: &DownloaderConfig, client: reqwest::Client) -> Self {
        Self {
            sources: config.cookie_sources.clone(),
            cache_dir: config.default_cookies_dir(),
            ttl: DEFAULT_COOKIES_TTL,
            client,
            cache: DashMap::new(),
            refresh: Mutex::new(()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Default cookie file for `site`, if one is configured.
    ///
    /// A configured path wins when the file exists. Otherwise the configured
    /// URL is fetched, unless a fresh cached copy is on disk.
    pub async fn path_for(&self, site: CookieSite) -> Result<Option<PathBuf>> {
        let Some(source) = self.sources.iter().find(|s| s.site == site) else {
            return Ok(None);
        };

        if let Some(path) = &source.path {
            let resolved = resolve_relative(path)?;
            if tokio::fs::try_exists(&resolved).await.unwrap_or(false) {
                return Ok(Some(resolved));
            }
            debug!(site = site.as_str(), path = %resolved.display(), "Configured cookie file missing");
        }

        let Some(url) = &source.url else {
            return Ok(None);
        };

        if let Some(path) = self.fresh_cached(site, url).await {
            return Ok(Some(path));
        }

        let _guard = self.refresh.lock().await;
        // Another job may have refreshed while we waited.
        if let Some(path) = self.fresh_cached(site, url).await {
            return Ok(Some(path));
        }

        let contents = self.download(url).await?;
        ensure_dir_all(&self.cache_dir).await?;
        let path = self.cache_dir.join(format!("{}-cookies.txt", site.as_str()));
        write_atomically(&path, contents.as_bytes()).await?;
        info!(site = site.as_str(), "Fetched default cookies");

        self.cache.insert(
            site,
            CachedCookies {
                path: path.clone(),
                source: url.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(Some(path))
    }

    async fn fresh_cached(&self, site: CookieSite, url: &str) -> Option<PathBuf> {
        let path = {
            let entry = self.cache.get(&site)?;
            if entry.source != url || entry.fetched_at.elapsed() >= self.ttl {
                return None;
            }
            entry.path.clone()
        };
        tokio::fs::try_exists(&path)
            .await
            .unwrap_or(false)
            .then_some(path)
    }

    async fn download(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .timeout(FETCH_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Other(format!(
                "Failed to fetch cookies ({})",
                status.as_u16()
            )));
        }
        Ok(response.text().await?)
    }
}

/// Write request-supplied cookie contents for one job.
pub async fn write_job_cookies(
    config: &DownloaderConfig,
    id: &JobId,
    contents: &str,
) -> Result<PathBuf> {
    ensure_dir_all(&config.cookies_dir()).await?;
    let path = config.job_cookie_file(id);
    write_atomically(&path, contents.as_bytes()).await?;
    Ok(path)
}

fn resolve_relative(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
