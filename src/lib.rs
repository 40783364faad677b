pub mod artifact;
pub mod cache;
pub mod cdn;
pub mod compositor;
pub mod concurrency;
pub mod config;
pub mod decode;
pub mod error;
pub mod fetch;
pub mod fingerprint;
pub mod http;
pub mod model;
pub mod registry;
pub mod telemetry;

pub use config::AppConfig;
pub use error::ServiceError;
pub use http::{AppState, build_router};
pub use registry::JobRegistry;
