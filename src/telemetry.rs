//! Structured logging and OpenTelemetry tracing bootstrap.
//!
//! Adapted from the teacher's `telemetry::initialise_tracing`: this service
//! always runs non-interactively (there is no TTY to paint progress bars
//! into), so only the structured-output branch survives, with an optional
//! pretty-printed mode for local development.

use std::sync::OnceLock;

use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LogLevel;
use crate::error::TelemetryError;

static TRACING_INITIALISED: OnceLock<Result<(), TelemetryError>> = OnceLock::new();

/// Initialises structured logging and OpenTelemetry tracing support.
///
/// `log_level`, when set, takes precedence over `RUST_LOG` (matching the
/// teacher's `--log-level` CLI override).
///
/// Safe to call more than once; only the first call's outcome takes effect.
pub fn initialise_tracing(
    service_name: &str,
    pretty: bool,
    log_level: Option<LogLevel>,
) -> Result<(), &'static TelemetryError> {
    match TRACING_INITIALISED.get_or_init(|| initialise_tracing_once(service_name, pretty, log_level)) {
        Ok(()) => Ok(()),
        Err(error) => Err(error),
    }
}

fn initialise_tracing_once(
    service_name: &str,
    pretty: bool,
    log_level: Option<LogLevel>,
) -> Result<(), TelemetryError> {
    let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder().build();
    let tracer = tracer_provider.tracer(service_name.to_owned());
    global::set_tracer_provider(tracer_provider);

    let log_filter = match log_level {
        Some(level) => EnvFilter::new(level.as_filter_str()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    if pretty {
        tracing_subscriber::registry()
            .with(fmt::layer().pretty().with_target(false).with_filter(log_filter))
            .with(OpenTelemetryLayer::new(tracer))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(false).with_filter(log_filter))
            .with(OpenTelemetryLayer::new(tracer))
            .try_init()?;
    }

    Ok(())
}
