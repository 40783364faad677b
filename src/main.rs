use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use render_service::artifact::ArtifactStore;
use render_service::concurrency::RenderLimiter;
use render_service::decode::DecoderCache;
use render_service::fetch::AssetFetcher;
use render_service::{AppConfig, AppState, JobRegistry, build_router};

#[tokio::main]
async fn main() -> ExitCode {
    let config = AppConfig::parse();

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    config.validate().context("invalid configuration")?;
    render_service::telemetry::initialise_tracing(
        "render-service",
        config.log_format_pretty,
        config.log_level,
    )
    .map_err(|error| anyhow::anyhow!("{error}"))?;

    let config = Arc::new(config);

    let client = AssetFetcher::build_client(Duration::from_millis(config.request_timeout_ms))
        .context("failed to build HTTP client")?;
    let fetcher = Arc::new(AssetFetcher::new(
        client,
        Duration::from_millis(config.cache_ttl_ms),
        config.cache_max_items,
    ));
    let decoder = Arc::new(DecoderCache::new(
        Duration::from_millis(config.cache_ttl_ms),
        (config.cache_max_items / 2).max(1),
    ));
    let limiter = RenderLimiter::new(config.render_concurrency);
    let artifacts = Arc::new(ArtifactStore::new(
        config.output_dir.clone(),
        config.public_base_url.clone(),
    ));

    let registry = Arc::new(JobRegistry::new(
        Arc::clone(&config),
        fetcher,
        decoder,
        limiter,
        Arc::clone(&artifacts),
    ));

    let state = AppState {
        config: Arc::clone(&config),
        registry,
        artifacts,
    };

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;

    info!(port = config.port, public_base_url = %config.public_base_url, "render-service listening");
    axum::serve(listener, router)
        .await
        .context("server error")?;

    Ok(())
}
