//! HTTP boundary (§6, §10.4): the `axum::Router` wiring job submission,
//! polling, artifact serving, and the service descriptor/health endpoints.

mod auth;
mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::artifact::ArtifactStore;
use crate::config::AppConfig;
use crate::registry::JobRegistry;

/// Shared state threaded through every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<JobRegistry>,
    pub artifacts: Arc<ArtifactStore>,
}

/// Builds the complete router for the service (§6).
#[must_use]
pub fn build_router(state: AppState) -> Router {
    let job_routes = Router::new()
        .route("/jobs", post(handlers::submit_job))
        .route("/jobs/:id", get(handlers::poll_job))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_bearer_token));

    Router::new()
        .route("/", get(handlers::descriptor))
        .route("/health", get(handlers::health))
        .route("/out/:filename", get(handlers::serve_artifact))
        .merge(job_routes)
        .layer(DefaultBodyLimit::max(state.config.json_body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
