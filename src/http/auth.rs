//! Bearer-auth middleware for the job endpoints (§6). `/out/*`, `/`, and
//! `/health` never go through this layer — it is attached only to the
//! `/jobs` routes in [`super::build_router`].

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ServiceError;

use super::AppState;

pub async fn require_bearer_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let Some(expected) = state.config.api_token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let presented = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    if presented == Some(expected) {
        Ok(next.run(request).await)
    } else {
        Err(ServiceError::Unauthorized)
    }
}
