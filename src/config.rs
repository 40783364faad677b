//! Startup configuration: CLI flags that double as environment variables,
//! mirroring the teacher's `Args` (clap `Parser` with `env = "..."` on every
//! field so a container deployment and a local `--flag` invocation are the
//! same code path).

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::error::ConfigError;

/// Log verbosity override for tracing and log events, layered over
/// `RUST_LOG`/`EnvFilter` the way the teacher's CLI does (§10.2).
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    #[must_use]
    pub fn as_filter_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Render-service startup configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "render-service", about = "Layered PNG/GIF render service.")]
pub struct AppConfig {
    /// Listen port.
    #[arg(long, env = "PORT", default_value_t = Self::DEFAULT_PORT)]
    pub port: u16,

    /// Public base URL used to compose artifact URLs.
    #[arg(long, env = "PUBLIC_BASE_URL", default_value = "http://localhost:8081")]
    pub public_base_url: String,

    /// Optional bearer token. When unset, the job endpoints are unauthenticated.
    #[arg(long, env = "API_TOKEN")]
    pub api_token: Option<String>,

    /// CDN root used to resolve layer URLs.
    #[arg(long, env = "ASSET_BASE_URL")]
    pub asset_base_url: Option<String>,

    /// Maximum accepted JSON request body, in bytes.
    #[arg(long, env = "JSON_BODY_LIMIT_BYTES", default_value_t = Self::DEFAULT_JSON_BODY_LIMIT_BYTES)]
    pub json_body_limit_bytes: usize,

    /// Maximum accepted canvas width.
    #[arg(long, env = "MAX_WIDTH", default_value_t = Self::DEFAULT_MAX_DIMENSION)]
    pub max_width: u32,

    /// Maximum accepted canvas height.
    #[arg(long, env = "MAX_HEIGHT", default_value_t = Self::DEFAULT_MAX_DIMENSION)]
    pub max_height: u32,

    /// Maximum accepted layer count per job.
    #[arg(long, env = "MAX_LAYERS", default_value_t = Self::DEFAULT_MAX_LAYERS)]
    pub max_layers: usize,

    /// Maximum accepted frame count across all animated layers.
    #[arg(long, env = "MAX_FRAMES", default_value_t = Self::DEFAULT_MAX_FRAMES)]
    pub max_frames: usize,

    /// Byte/decoded-image cache entry time-to-live, in milliseconds.
    #[arg(long, env = "CACHE_TTL_MS", default_value_t = Self::DEFAULT_CACHE_TTL_MS)]
    pub cache_ttl_ms: u64,

    /// Byte cache maximum entry count (the decoder cache uses half this).
    #[arg(long, env = "CACHE_MAX_ITEMS", default_value_t = Self::DEFAULT_CACHE_MAX_ITEMS)]
    pub cache_max_items: usize,

    /// Per-request asset fetch timeout, in milliseconds.
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value_t = Self::DEFAULT_REQUEST_TIMEOUT_MS)]
    pub request_timeout_ms: u64,

    /// Bounded fan-out for `pet_gif_frames` frame fetches.
    #[arg(long, env = "FRAME_FETCH_CONCURRENCY", default_value_t = Self::DEFAULT_FETCH_CONCURRENCY)]
    pub frame_fetch_concurrency: usize,

    /// Bounded fan-out for static layer fetches.
    #[arg(long, env = "STATIC_FETCH_CONCURRENCY", default_value_t = Self::DEFAULT_FETCH_CONCURRENCY)]
    pub static_fetch_concurrency: usize,

    /// Global concurrent-render permit count.
    #[arg(long, env = "RENDER_CONCURRENCY", default_value_t = Self::DEFAULT_RENDER_CONCURRENCY)]
    pub render_concurrency: usize,

    /// Default GIF frame delay, in milliseconds, when unspecified by the job.
    #[arg(long, env = "DEFAULT_GIF_DELAY_MS", default_value_t = Self::DEFAULT_GIF_DELAY_MS)]
    pub default_gif_delay_ms: u32,

    /// Directory artifacts are written to and served from.
    #[arg(long, env = "OUTPUT_DIR", default_value = "./data/out")]
    pub output_dir: PathBuf,

    /// Emit human-readable logs instead of JSON.
    #[arg(long, env = "LOG_FORMAT_PRETTY")]
    pub log_format_pretty: bool,

    /// Overrides the telemetry log verbosity, taking precedence over `RUST_LOG`.
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    pub log_level: Option<LogLevel>,
}

impl AppConfig {
    pub const DEFAULT_PORT: u16 = 8081;
    pub const DEFAULT_JSON_BODY_LIMIT_BYTES: usize = 8 * 1024 * 1024;
    pub const DEFAULT_MAX_DIMENSION: u32 = 1024;
    pub const DEFAULT_MAX_LAYERS: usize = 50;
    pub const DEFAULT_MAX_FRAMES: usize = 120;
    pub const DEFAULT_CACHE_TTL_MS: u64 = 60_000;
    pub const DEFAULT_CACHE_MAX_ITEMS: usize = 1_000;
    pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;
    pub const DEFAULT_FETCH_CONCURRENCY: usize = 10;
    pub const DEFAULT_RENDER_CONCURRENCY: usize = 4;
    pub const DEFAULT_GIF_DELAY_MS: u32 = 180;

    /// Validates cross-field invariants that `clap` cannot express directly.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingAssetBaseUrl`] if `ASSET_BASE_URL` was not
    /// supplied by either a flag or the environment.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.asset_base_url.as_deref().unwrap_or_default().is_empty() {
            return Err(ConfigError::MissingAssetBaseUrl);
        }
        Ok(())
    }

    /// Returns the validated asset base URL, trimmed of a trailing slash.
    #[must_use]
    pub fn asset_base_url(&self) -> &str {
        self.asset_base_url
            .as_deref()
            .unwrap_or_default()
            .trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use clap::Parser;

    use super::*;

    #[test]
    fn validate_rejects_missing_asset_base_url() {
        let config = AppConfig::parse_from(["render-service"]);
        assert_matches!(config.validate(), Err(ConfigError::MissingAssetBaseUrl));
    }

    #[test]
    fn validate_accepts_configured_asset_base_url() {
        let config = AppConfig::parse_from([
            "render-service",
            "--asset-base-url",
            "https://cdn.example.com",
        ]);
        assert_matches!(config.validate(), Ok(()));
        assert_eq!("https://cdn.example.com", config.asset_base_url());
    }

    #[test]
    fn asset_base_url_trims_trailing_slash() {
        let config = AppConfig::parse_from([
            "render-service",
            "--asset-base-url",
            "https://cdn.example.com/",
        ]);
        assert_eq!("https://cdn.example.com", config.asset_base_url());
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::parse_from([
            "render-service",
            "--asset-base-url",
            "https://cdn.example.com",
        ]);
        assert_eq!(8081, config.port);
        assert_eq!(1024, config.max_width);
        assert_eq!(1024, config.max_height);
        assert_eq!(50, config.max_layers);
        assert_eq!(120, config.max_frames);
        assert_eq!(4, config.render_concurrency);
        assert_eq!(180, config.default_gif_delay_ms);
        assert_eq!(None, config.log_level);
    }

    #[test]
    fn log_level_overrides_env_filter() {
        let config = AppConfig::parse_from([
            "render-service",
            "--asset-base-url",
            "https://cdn.example.com",
            "--log-level",
            "trace",
        ]);
        assert_matches!(config.log_level, Some(LogLevel::Trace));
    }
}
