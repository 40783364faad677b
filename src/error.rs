//! Error taxonomy for the render pipeline and its HTTP boundary.
//!
//! Each module that can fail publishes its own `thiserror` enum; `ServiceError`
//! aggregates the ones that can surface to a caller and maps them to an HTTP
//! status in `src/http/mod.rs`. Per-layer fetch/decode errors never reach
//! `ServiceError` directly — the compositor swallows them (see [`crate::compositor`]).

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Errors returned by the asset fetcher (§4.1).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("data url header does not match `data:<media>;base64,<payload>`")]
    InvalidDataUrl,
    #[error("invalid base64 payload in data url")]
    InvalidDataUrlPayload(#[source] base64::DecodeError),
    #[error("upstream returned status {status} for {url}")]
    Upstream { status: u16, url: String },
    #[error("request to {url} failed")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unsupported url scheme in {0}")]
    UnsupportedScheme(String),
}

/// Errors returned by the image decoder cache (§4.2).
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to decode image bytes")]
    Image(#[from] image::ImageError),
}

/// Errors fatal to a whole render (§4.4, §7: `EncodeError`).
#[derive(Debug, Error)]
pub enum CompositorError {
    #[error("failed to encode output image")]
    Encode(#[source] image::ImageError),
    #[error("failed to encode gif frame")]
    GifEncode(#[source] gif::EncodingError),
}

/// Errors returned when validating a submitted job payload (§4.6).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("guild must be a non-empty string")]
    MissingGuild,
    #[error("user must be a non-empty string")]
    MissingUser,
    #[error("width {width} exceeds maximum {max}")]
    WidthExceedsMax { width: u32, max: u32 },
    #[error("height {height} exceeds maximum {max}")]
    HeightExceedsMax { height: u32, max: u32 },
    #[error("layer count {count} exceeds maximum {max}")]
    TooManyLayers { count: usize, max: usize },
    #[error("frame count {count} exceeds maximum {max}")]
    TooManyFrames { count: usize, max: usize },
}

/// Errors returned by the job registry (§4.6, §4.7).
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid job payload: {0}")]
    InvalidPayload(#[from] ValidationError),
    #[error("no job found with this id")]
    NotFound,
    #[error(transparent)]
    Compositor(#[from] CompositorError),
    #[error("failed to write rendered artifact")]
    Io(#[source] std::io::Error),
}

/// Errors returned by configuration loading at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ASSET_BASE_URL is required but was not set")]
    MissingAssetBaseUrl,
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Top-level error surfaced at the HTTP boundary.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("job not found")]
    NotFound,
    #[error("missing or invalid bearer token")]
    Unauthorized,
    #[error("internal render failure")]
    Internal(#[source] anyhow::Error),
}

impl From<RegistryError> for ServiceError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::InvalidPayload(source) => Self::Validation(source),
            RegistryError::NotFound => Self::NotFound,
            other => Self::Internal(other.into()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody { error: self.to_string() };
        (status, Json(body)).into_response()
    }
}
