//! Metadata lookup route.

use axum::{Json, Router, extract::State, routing::post};
use tracing::debug;

use crate::api::error::ApiResult;
use crate::api::models::InfoRequest;
use crate::api::server::AppState;
use crate::downloader::MediaInfo;
use crate::downloader::platform::validate_url;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(fetch_info))
}

/// Describe a video, or list a playlist, without downloading anything.
///
/// Nothing is created on the server; failures are reported to this request.
async fn fetch_info(
    State(state): State<AppState>,
    Json(request): Json<InfoRequest>,
) -> ApiResult<Json<MediaInfo>> {
    let url = validate_url(request.url.as_deref().unwrap_or_default())?;
    debug!(url = %url, playlist = request.playlist, "Fetching media info");

    let info = state
        .downloads
        .metadata()
        .fetch_info(&url, request.playlist)
        .await?;
    Ok(Json(info))
}
