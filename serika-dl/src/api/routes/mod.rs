//! API route modules.
//!
//! Organizes routes by resource type.

pub mod download;
pub mod file;
pub mod health;
pub mod info;
pub mod logging;
pub mod status;

use axum::Router;

use crate::api::error::ApiError;
use crate::api::server::AppState;
use crate::jobs::JobId;

/// Everything under `/api`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/api/info", info::router())
        .nest("/api/download", download::router())
        .nest("/api/status", status::router())
        .nest("/api/file", file::router())
        .nest("/api/logging", logging::router())
}

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    api_routes()
        .nest("/health", health::router())
        .with_state(state)
}

/// Parse the `id` query parameter shared by the status and file endpoints.
pub(crate) fn parse_job_id(raw: Option<&str>) -> Result<JobId, ApiError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("Download ID required"))?;
    JobId::parse_str(raw).map_err(|_| ApiError::bad_request("Invalid download ID"))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Response;
    use tempfile::TempDir;

    use crate::api::server::AppState;
    use crate::config::DownloaderConfig;
    use crate::downloader::DownloadService;
    use crate::jobs::JobRegistry;

    /// App state rooted in `temp`, running `ytdlp` for downloads.
    pub fn state(temp: &TempDir, ytdlp: PathBuf) -> AppState {
        let config = DownloaderConfig {
            jobs_root: temp.path().join("jobs"),
            ytdlp_path: ytdlp,
            ffmpeg_path: temp.path().join("no-ffmpeg"),
            completion_grace: Duration::ZERO,
            ..DownloaderConfig::default()
        };
        let downloads = DownloadService::new(config, Arc::new(JobRegistry::new())).unwrap();
        AppState::new(Arc::new(downloads))
    }

    pub async fn json(response: Response<Body>) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_parse_job_id() {
        let id = JobId::new_v4();
        assert_eq!(parse_job_id(Some(&id.to_string())).unwrap(), id);

        let missing = parse_job_id(None).unwrap_err();
        assert_eq!(missing.status, StatusCode::BAD_REQUEST);
        assert_eq!(missing.message, "Download ID required");

        let blank = parse_job_id(Some("  ")).unwrap_err();
        assert_eq!(blank.message, "Download ID required");

        let traversal = parse_job_id(Some("../../etc")).unwrap_err();
        assert_eq!(traversal.message, "Invalid download ID");
    }
}
