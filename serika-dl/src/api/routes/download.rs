//! Download start route.

use axum::{Json, Router, extract::State, routing::post};

use crate::api::error::ApiResult;
use crate::api::models::DownloadStartedResponse;
use crate::api::server::AppState;
use crate::downloader::DownloadOptions;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(start_download))
}

/// Accept a download and return its id right away; progress is polled
/// through `/api/status`.
async fn start_download(
    State(state): State<AppState>,
    Json(options): Json<DownloadOptions>,
) -> ApiResult<Json<DownloadStartedResponse>> {
    let started = state.downloads.start(options).await?;
    Ok(Json(DownloadStartedResponse::new(started.id, started.mode)))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::api::routes::test_support::{json, state};
    use crate::downloader::testing::fake_tool;
    use crate::jobs::JobId;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_start_returns_id_and_registers_job() {
        let temp = TempDir::new().unwrap();
        let ytdlp = fake_tool(temp.path(), "yt-dlp", "exit 0");
        let state = state(&temp, ytdlp);
        let app = router().with_state(state.clone());

        let response = app
            .oneshot(post_json(
                r#"{"url":"https://youtu.be/abc","thumbnailOnly":true}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        assert_eq!(body["status"], "started");
        assert_eq!(body["mode"], "thumbnail");
        let id = JobId::parse_str(body["downloadId"].as_str().unwrap()).unwrap();
        assert!(state.downloads.registry().contains(&id));
        assert!(state.downloads.config().job_dir(&id).is_dir());
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_without_a_job() {
        let temp = TempDir::new().unwrap();
        let state = state(&temp, temp.path().join("yt-dlp"));
        let app = router().with_state(state.clone());

        let response = app
            .oneshot(post_json(r#"{"url":"--exec rm"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.downloads.registry().is_empty());
    }
}
