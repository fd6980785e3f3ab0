//! API request and response models (DTOs).
//!
//! Bodies use camelCase to match the web client.

use serde::{Deserialize, Serialize};

use crate::jobs::{DownloadMode, Job, JobId, JobStatus};

// ============================================================================
// Info
// ============================================================================

/// Body of `POST /api/info`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InfoRequest {
    /// Missing or blank is reported as a 400, not a deserialization failure.
    #[serde(default)]
    pub url: Option<String>,
    /// List playlist entries instead of describing a single video.
    #[serde(default)]
    pub playlist: bool,
}

// ============================================================================
// Download
// ============================================================================

/// Reply to an accepted `POST /api/download`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadStartedResponse {
    pub download_id: JobId,
    pub status: String,
    pub mode: DownloadMode,
    pub message: String,
}

impl DownloadStartedResponse {
    pub fn new(download_id: JobId, mode: DownloadMode) -> Self {
        Self {
            download_id,
            status: "started".to_string(),
            mode,
            message: "Download started".to_string(),
        }
    }
}

// ============================================================================
// Status
// ============================================================================

/// `?id=` query of the status and file endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobQuery {
    pub id: Option<String>,
}

/// Reply to `GET /api/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<String>,
    pub mode: DownloadMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filesize: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_count: Option<usize>,
    /// Only reported for failed jobs. yt-dlp prints non-fatal `ERROR:` lines
    /// too, and the exit code decides the outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Completed and at least one deliverable file is on disk.
    pub downloadable: bool,
}

impl From<&Job> for StatusResponse {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            progress: job.progress,
            speed: job.speed.clone(),
            eta: job.eta.clone(),
            mode: job.mode,
            filename: job.filename.clone(),
            filesize: None,
            file_count: None,
            error: (job.status == JobStatus::Error)
                .then(|| job.error.clone())
                .flatten(),
            downloadable: false,
        }
    }
}

// ============================================================================
// Logging
// ============================================================================

/// Request to update the log filter.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateLogFilterRequest {
    pub filter: String,
}

/// Response for logging configuration.
#[derive(Debug, Clone, Serialize)]
pub struct LoggingConfigResponse {
    pub filter: String,
    pub available_modules: Vec<ModuleInfo>,
}

/// Information about an available logging module.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleInfo {
    pub name: String,
    pub description: String,
}

// ============================================================================
// Health
// ============================================================================

/// Overall health.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub active_jobs: usize,
    pub components: Vec<ComponentHealth>,
}

/// Component health status.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_response_uses_camel_case_and_skips_absent_fields() {
        let mut job = Job::new(Uuid::new_v4(), DownloadMode::Audio);
        job.progress = 12.5;
        let mut response = StatusResponse::from(&job);
        response.file_count = Some(2);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "queued");
        assert_eq!(json["mode"], "audio");
        assert_eq!(json["progress"], 12.5);
        assert_eq!(json["fileCount"], 2);
        assert_eq!(json["downloadable"], false);
        assert!(json.get("speed").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_error_text_only_reported_for_failed_jobs() {
        let mut job = Job::new(Uuid::new_v4(), DownloadMode::Video);
        job.error = Some("Unable to download subtitles".to_string());

        for status in [JobStatus::Downloading, JobStatus::Completed] {
            job.status = status;
            let json = serde_json::to_value(StatusResponse::from(&job)).unwrap();
            assert!(json.get("error").is_none(), "status {status}");
        }

        job.status = JobStatus::Error;
        let json = serde_json::to_value(StatusResponse::from(&job)).unwrap();
        assert_eq!(json["error"], "Unable to download subtitles");
    }

    #[test]
    fn test_info_request_defaults() {
        let req: InfoRequest = serde_json::from_str("{}").unwrap();
        assert!(req.url.is_none());
        assert!(!req.playlist);
    }

    #[test]
    fn test_download_started_response() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(DownloadStartedResponse::new(id, DownloadMode::Video)).unwrap();
        assert_eq!(json["downloadId"], id.to_string());
        assert_eq!(json["status"], "started");
    }
}
