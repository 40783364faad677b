//! Handlers for the five HTTP operations (§6).

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;

use crate::error::ServiceError;
use crate::model::JobPayload;

use super::AppState;

#[derive(Serialize)]
pub struct SubmitResponse {
    #[serde(rename = "jobId")]
    job_id: String,
}

pub async fn submit_job(
    State(state): State<AppState>,
    Json(payload): Json<JobPayload>,
) -> Result<Json<SubmitResponse>, ServiceError> {
    let job_id = state.registry.submit(payload).map_err(ServiceError::from)?;
    Ok(Json(SubmitResponse { job_id }))
}

pub async fn poll_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, ServiceError> {
    let record = state.registry.poll(&job_id).map_err(ServiceError::from)?;
    Ok(Json(record).into_response())
}

/// Serves `<fingerprint>.<ext>` from the artifact directory with long-lived
/// immutable caching. `filename` is a single path segment — rejecting any
/// value containing `/` keeps the lookup inside [`ArtifactStore::output_dir`]
/// without ever resolving a path outside it.
pub async fn serve_artifact(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ServiceError> {
    if filename.contains('/') || filename.contains("..") || filename.is_empty() {
        return Err(ServiceError::NotFound);
    }

    let path = state.artifacts.output_dir().join(&filename);
    let bytes = tokio::fs::read(&path).await.map_err(|_| ServiceError::NotFound)?;

    let content_type = if filename.ends_with(".gif") {
        "image/gif"
    } else if filename.ends_with(".png") {
        "image/png"
    } else {
        "application/octet-stream"
    };

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        bytes,
    )
        .into_response())
}

pub async fn descriptor() -> Json<serde_json::Value> {
    Json(json!({
        "name": "render-service",
        "version": env!("CARGO_PKG_VERSION"),
        "capabilities": ["png", "gif"],
    }))
}

pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}
