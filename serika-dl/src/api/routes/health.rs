//! Health check routes.

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};

use crate::api::models::{ComponentHealth, HealthResponse};
use crate::api::server::AppState;
use crate::downloader::binary;

/// Create the health router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
}

fn ytdlp_health(state: &AppState) -> ComponentHealth {
    let path = &state.downloads.config().ytdlp_path;
    if binary::is_available(path) {
        ComponentHealth {
            name: "yt-dlp".to_string(),
            status: "healthy".to_string(),
            message: None,
        }
    } else {
        ComponentHealth {
            name: "yt-dlp".to_string(),
            status: "unhealthy".to_string(),
            message: Some(format!("{} not found", path.display())),
        }
    }
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let ytdlp = ytdlp_health(&state);
    let status = if ytdlp.status == "healthy" {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        active_jobs: state.downloads.registry().len(),
        components: vec![ytdlp],
    })
}

/// Readiness check: downloads cannot work without yt-dlp.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if binary::is_available(&state.downloads.config().ytdlp_path) {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

/// Liveness check - is the service alive?
async fn liveness_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "alive",
            "uptime_secs": uptime
        })),
    )
}
