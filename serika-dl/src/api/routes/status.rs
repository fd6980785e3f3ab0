//! Job status route.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use tracing::debug;

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{JobQuery, StatusResponse};
use crate::api::routes::parse_job_id;
use crate::api::server::AppState;
use crate::files::summarize;
use crate::jobs::JobStatus;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_status))
}

/// Current progress record of a job, cross-checked against its files.
///
/// Unknown and evicted ids are 404. A failed job is reported as is, without
/// touching the filesystem.
async fn get_status(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> ApiResult<Json<StatusResponse>> {
    let id = parse_job_id(query.id.as_deref())?;
    let job = state
        .downloads
        .registry()
        .get(&id)
        .ok_or_else(|| ApiError::not_found(format!("Download '{id}' not found")))?;

    let mut response = StatusResponse::from(&job);
    if job.status == JobStatus::Error {
        return Ok(Json(response));
    }

    let dir = state.downloads.config().job_dir(&id);
    match summarize(&dir, job.mode).await {
        Ok(Some(found)) => {
            response.filename = Some(found.main_file);
            response.filesize = Some(found.filesize);
            response.file_count = Some(found.file_count);
            response.downloadable = job.status == JobStatus::Completed;
        }
        Ok(None) => {}
        // Files move around while yt-dlp is merging; the next poll retries.
        Err(e) => debug!(job_id = %id, error = %e, "Deliverable lookup failed"),
    }

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::test_support::{json, state};
    use crate::jobs::{DownloadMode, JobId, JobPatch};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_and_invalid_id_are_bad_requests() {
        let temp = TempDir::new().unwrap();
        let app = router().with_state(state(&temp, temp.path().join("yt-dlp")));

        let response = app.clone().oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.oneshot(get("/?id=not-a-uuid")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let temp = TempDir::new().unwrap();
        let app = router().with_state(state(&temp, temp.path().join("yt-dlp")));

        let response = app
            .oneshot(get(&format!("/?id={}", JobId::new_v4())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_in_progress_job_reports_progress_but_not_downloadable() {
        let temp = TempDir::new().unwrap();
        let state = state(&temp, temp.path().join("yt-dlp"));
        let id = JobId::new_v4();
        let registry = state.downloads.registry();
        registry.create(id, DownloadMode::Video);
        registry.update(
            &id,
            JobPatch::new()
                .progress(45.2)
                .status(JobStatus::Downloading)
                .speed("5.67MiB/s"),
        );
        let dir = state.downloads.config().job_dir(&id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("Clip.mp4.part"), b"partial").unwrap();

        let response = router()
            .with_state(state)
            .oneshot(get(&format!("/?id={id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["status"], "downloading");
        assert_eq!(body["progress"], 45.2);
        assert_eq!(body["speed"], "5.67MiB/s");
        assert_eq!(body["downloadable"], false);
        assert!(body.get("filesize").is_none());
    }

    #[tokio::test]
    async fn test_completed_job_with_file_is_downloadable() {
        let temp = TempDir::new().unwrap();
        let state = state(&temp, temp.path().join("yt-dlp"));
        let id = JobId::new_v4();
        let registry = state.downloads.registry();
        registry.create(id, DownloadMode::Audio);
        registry.update(&id, JobPatch::new().progress(100.0).status(JobStatus::Completed));
        let dir = state.downloads.config().job_dir(&id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("Song.mp3"), vec![0u8; 64]).unwrap();
        std::fs::write(dir.join("Song.jpg"), b"jpg").unwrap();

        let response = router()
            .with_state(state)
            .oneshot(get(&format!("/?id={id}")))
            .await
            .unwrap();
        let body = json(response).await;
        assert_eq!(body["status"], "completed");
        assert_eq!(body["filename"], "Song.mp3");
        assert_eq!(body["filesize"], 64);
        assert_eq!(body["fileCount"], 2);
        assert_eq!(body["downloadable"], true);
    }

    #[tokio::test]
    async fn test_failed_job_reports_error() {
        let temp = TempDir::new().unwrap();
        let state = state(&temp, temp.path().join("yt-dlp"));
        let id = JobId::new_v4();
        let registry = state.downloads.registry();
        registry.create(id, DownloadMode::Video);
        registry.update(
            &id,
            JobPatch::new()
                .progress(12.0)
                .status(JobStatus::Error)
                .error("HTTP Error 403: Forbidden"),
        );

        let response = router()
            .with_state(state)
            .oneshot(get(&format!("/?id={id}")))
            .await
            .unwrap();
        let body = json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["progress"], 12.0);
        assert_eq!(body["error"], "HTTP Error 403: Forbidden");
        assert_eq!(body["downloadable"], false);
    }
}
