//! Job record and partial updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque job identifier.
pub type JobId = Uuid;

/// What a job was asked to produce. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DownloadMode {
    #[default]
    Video,
    Audio,
    Thumbnail,
    Subtitles,
}

impl DownloadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Thumbnail => "thumbnail",
            Self::Subtitles => "subtitles",
        }
    }
}

impl std::fmt::Display for DownloadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a job.
///
/// `Queued` covers everything before the subprocess is spawned: waiting for
/// a concurrency slot and fetching track metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Queued,
    Downloading,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Completed and Error are terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Progress/status record of one download job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    /// 0 to 100.
    pub progress: f64,
    pub status: JobStatus,
    pub speed: Option<String>,
    pub eta: Option<String>,
    /// Base name of the resolved output file, as reported by yt-dlp.
    pub filename: Option<String>,
    pub mode: DownloadMode,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// When set, the janitor evicts the job (and its files) after this instant.
    #[serde(skip)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: JobId, mode: DownloadMode) -> Self {
        let now = Utc::now();
        Self {
            id,
            progress: 0.0,
            status: JobStatus::Queued,
            speed: None,
            eta: None,
            filename: None,
            mode,
            error: None,
            created_at: now,
            updated_at: now,
            expires_at: None,
        }
    }

    /// Raise progress to at least `floor`; never lowers it.
    pub fn raise_progress(&mut self, floor: f64) {
        if self.progress < floor {
            self.progress = floor;
        }
    }

    pub fn clear_transfer_stats(&mut self) {
        self.speed = None;
        self.eta = None;
    }
}

/// Partial update of a [`Job`].
///
/// Fields left as `None` are not touched. `speed` and `eta` use a nested
/// option so they can be explicitly cleared with `Some(None)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub progress: Option<f64>,
    pub status: Option<JobStatus>,
    pub speed: Option<Option<String>>,
    pub eta: Option<Option<String>>,
    pub filename: Option<String>,
    pub error: Option<String>,
}

impl JobPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn speed(mut self, speed: impl Into<String>) -> Self {
        self.speed = Some(Some(speed.into()));
        self
    }

    pub fn eta(mut self, eta: impl Into<String>) -> Self {
        self.eta = Some(Some(eta.into()));
        self
    }

    /// Clear both speed and ETA.
    pub fn clear_transfer_stats(mut self) -> Self {
        self.speed = Some(None);
        self.eta = Some(None);
        self
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Merge the patch into `job`.
    pub fn apply(self, job: &mut Job) {
        if let Some(progress) = self.progress {
            job.progress = progress;
        }
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(speed) = self.speed {
            job.speed = speed;
        }
        if let Some(eta) = self.eta {
            job.eta = eta;
        }
        if let Some(filename) = self.filename {
            job.filename = Some(filename);
        }
        if let Some(error) = self.error {
            job.error = Some(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_defaults() {
        let job = Job::new(Uuid::new_v4(), DownloadMode::Audio);
        assert_eq!(job.progress, 0.0);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.mode, DownloadMode::Audio);
        assert!(job.expires_at.is_none());
    }

    #[test]
    fn test_patch_leaves_absent_fields_untouched() {
        let mut job = Job::new(Uuid::new_v4(), DownloadMode::Video);
        job.speed = Some("1.00MiB/s".to_string());
        job.filename = Some("clip.mp4".to_string());

        JobPatch::new().progress(42.0).apply(&mut job);

        assert_eq!(job.progress, 42.0);
        assert_eq!(job.speed.as_deref(), Some("1.00MiB/s"));
        assert_eq!(job.filename.as_deref(), Some("clip.mp4"));
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[test]
    fn test_patch_clears_transfer_stats() {
        let mut job = Job::new(Uuid::new_v4(), DownloadMode::Video);
        job.speed = Some("1.00MiB/s".to_string());
        job.eta = Some("00:10".to_string());

        JobPatch::new().clear_transfer_stats().apply(&mut job);

        assert!(job.speed.is_none());
        assert!(job.eta.is_none());
    }

    #[test]
    fn test_raise_progress_never_lowers() {
        let mut job = Job::new(Uuid::new_v4(), DownloadMode::Video);
        job.progress = 97.0;
        job.raise_progress(96.0);
        assert_eq!(job.progress, 97.0);
        job.raise_progress(98.0);
        assert_eq!(job.progress, 98.0);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Processing).unwrap(),
            "\"processing\""
        );
        assert_eq!(
            serde_json::to_string(&DownloadMode::Subtitles).unwrap(),
            "\"subtitles\""
        );
        assert!(JobStatus::Error.is_terminal());
        assert!(!JobStatus::Downloading.is_terminal());
    }
}
