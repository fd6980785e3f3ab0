//! Artifact retrieval routes.

use axum::{
    Router,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};

use crate::api::error::ApiResult;
use crate::api::models::JobQuery;
use crate::api::routes::parse_job_id;
use crate::api::server::AppState;
use crate::files::serve::{resolve, serve_artifact};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_file).head(head_file))
}

/// The job's file, or a zip of its files.
async fn get_file(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let id = parse_job_id(query.id.as_deref())?;
    let dir = state.downloads.config().job_dir(&id);
    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());

    Ok(serve_artifact(&dir, &id.to_string(), range).await?)
}

/// Readiness check with the same not-found rules as `GET`, without a body.
async fn head_file(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> ApiResult<Response> {
    let id = parse_job_id(query.id.as_deref())?;
    let dir = state.downloads.config().job_dir(&id);
    resolve(&dir, &id.to_string()).await?;

    Ok((
        StatusCode::OK,
        [(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"))],
    )
        .into_response())
}
