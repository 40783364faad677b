//! Job registry and dedup planner (§4.6, §4.7): validates and accepts jobs,
//! dispatches the render pipeline, coalesces concurrent identical jobs onto
//! one in-flight render, and tracks terminal job state.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::artifact::ArtifactStore;
use crate::cdn::resolve_layer_url;
use crate::compositor::{self, RenderFrame, RenderLayer};
use crate::concurrency::RenderLimiter;
use crate::config::AppConfig;
use crate::decode::DecoderCache;
use crate::error::{RegistryError, ValidationError};
use crate::fetch::AssetFetcher;
use crate::fingerprint::fingerprint;
use crate::model::{JobPayload, JobRecord, JobStatus, Layer, OutputFormat};

type RenderOutcome = Result<(String, String), String>;
type RenderFuture = Shared<BoxFuture<'static, RenderOutcome>>;

/// Validates a submitted job payload against the configured limits (§4.6).
pub fn validate_payload(payload: &JobPayload, config: &AppConfig) -> Result<(), ValidationError> {
    if payload.guild.trim().is_empty() {
        return Err(ValidationError::MissingGuild);
    }
    if payload.user.trim().is_empty() {
        return Err(ValidationError::MissingUser);
    }
    if payload.size.width > config.max_width {
        return Err(ValidationError::WidthExceedsMax {
            width: payload.size.width,
            max: config.max_width,
        });
    }
    if payload.size.height > config.max_height {
        return Err(ValidationError::HeightExceedsMax {
            height: payload.size.height,
            max: config.max_height,
        });
    }
    if payload.layers.len() > config.max_layers {
        return Err(ValidationError::TooManyLayers {
            count: payload.layers.len(),
            max: config.max_layers,
        });
    }
    let max_frame_count = payload
        .layers
        .iter()
        .filter_map(|layer| match layer {
            Layer::PetGifFrames { frames } => Some(frames.len()),
            _ => None,
        })
        .max()
        .unwrap_or(0);
    if max_frame_count > config.max_frames {
        return Err(ValidationError::TooManyFrames {
            count: max_frame_count,
            max: config.max_frames,
        });
    }
    Ok(())
}

/// Process-wide registry of job state plus the in-flight dedup table.
pub struct JobRegistry {
    config: Arc<AppConfig>,
    fetcher: Arc<AssetFetcher>,
    decoder: Arc<DecoderCache>,
    limiter: RenderLimiter,
    artifacts: Arc<ArtifactStore>,
    jobs: DashMap<String, JobRecord>,
    in_flight: DashMap<String, RenderFuture>,
}

impl JobRegistry {
    #[must_use]
    pub fn new(
        config: Arc<AppConfig>,
        fetcher: Arc<AssetFetcher>,
        decoder: Arc<DecoderCache>,
        limiter: RenderLimiter,
        artifacts: Arc<ArtifactStore>,
    ) -> Self {
        Self {
            config,
            fetcher,
            decoder,
            limiter,
            artifacts,
            jobs: DashMap::new(),
            in_flight: DashMap::new(),
        }
    }

    /// Validates and accepts `payload`, returning its job id immediately.
    /// The render pipeline runs on a detached background task.
    pub fn submit(self: &Arc<Self>, payload: JobPayload) -> Result<String, RegistryError> {
        validate_payload(&payload, &self.config)?;

        let job_id = Uuid::new_v4().to_string();
        self.jobs.insert(
            job_id.clone(),
            JobRecord {
                status: JobStatus::Pending,
                created_at: now_rfc3339(),
                finished_at: None,
                url: None,
                format: None,
                error: None,
            },
        );

        let registry = Arc::clone(self);
        let job_id_for_task = job_id.clone();
        tokio::spawn(async move {
            registry.run_job(job_id_for_task, payload).await;
        });

        Ok(job_id)
    }

    /// Returns the current record for `job_id`.
    pub fn poll(&self, job_id: &str) -> Result<JobRecord, RegistryError> {
        self.jobs
            .get(job_id)
            .map(|entry| entry.clone())
            .ok_or(RegistryError::NotFound)
    }

    #[instrument(skip(self, payload), fields(job_id = %job_id))]
    async fn run_job(self: Arc<Self>, job_id: String, payload: JobPayload) {
        let fp = fingerprint(&payload, self.config.default_gif_delay_ms);

        if let Some((url, ext)) = self.artifacts.lookup(&fp).await {
            self.mark_done(&job_id, url, ext.to_owned());
            return;
        }

        loop {
            let (shared, is_leader) = self.join_or_start(&fp, &payload);
            match shared.await {
                Ok((url, format)) => {
                    if is_leader {
                        self.in_flight.remove(&fp);
                    }
                    self.mark_done(&job_id, url, format);
                    return;
                }
                Err(message) => {
                    if is_leader {
                        self.in_flight.remove(&fp);
                        error!(fingerprint = %fp, error = %message, "render failed");
                        self.mark_error(&job_id, message);
                        return;
                    }
                    // A dedup follower does not inherit the leader's failure
                    // (§4.7): loop back and attempt a fresh render.
                }
            }
        }
    }

    /// Atomically joins an in-flight render for `fp`, or starts a fresh one
    /// (§5: `DashMap::entry` holds the shard lock across check-then-insert).
    fn join_or_start(self: &Arc<Self>, fp: &str, payload: &JobPayload) -> (RenderFuture, bool) {
        match self.in_flight.entry(fp.to_owned()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let registry = Arc::clone(self);
                let payload = payload.clone();
                let fp = fp.to_owned();
                let future: BoxFuture<'static, RenderOutcome> = async move {
                    registry
                        .render_and_write(&fp, &payload)
                        .await
                        .map_err(|error| error.to_string())
                }
                .boxed();
                let shared = future.shared();
                entry.insert(shared.clone());
                (shared, true)
            }
        }
    }

    async fn render_and_write(&self, fp: &str, payload: &JobPayload) -> Result<(String, String), RegistryError> {
        let layers = self.resolve_layers(payload);
        let wants_gif = payload.format == Some(OutputFormat::Gif)
            || layers.iter().any(|layer| matches!(layer, RenderLayer::Animated { .. }));

        let _permit = self.limiter.acquire().await;

        let (bytes, format) = if wants_gif {
            let output = compositor::compose_gif(
                payload.size.width,
                payload.size.height,
                &layers,
                payload.gif_options.as_ref(),
                self.config.default_gif_delay_ms,
                &self.fetcher,
                &self.decoder,
                self.config.frame_fetch_concurrency,
            )
            .await
            .map_err(RegistryError::Compositor)?;
            (output.bytes, output.format)
        } else {
            let bytes = compositor::compose_png(
                payload.size.width,
                payload.size.height,
                &layers,
                payload.background_color_hex.as_deref(),
                &self.fetcher,
                &self.decoder,
                self.config.static_fetch_concurrency,
            )
            .await
            .map_err(RegistryError::Compositor)?;
            (bytes, "png")
        };

        let url = self
            .artifacts
            .write(fp, format, &bytes)
            .await
            .map_err(RegistryError::Io)?;
        info!(fingerprint = fp, format, "render complete");
        Ok((url, format.to_owned()))
    }

    /// Resolves each submitted layer to a source URL ready for the
    /// compositor; layers whose URL cannot be derived are dropped (§4.6).
    fn resolve_layers(&self, payload: &JobPayload) -> Vec<RenderLayer> {
        payload
            .layers
            .iter()
            .filter_map(|layer| match layer {
                Layer::Static { url, rect } => Some(RenderLayer::Static {
                    url: url.clone(),
                    rect: *rect,
                }),
                Layer::PetGifFrames { frames } => Some(RenderLayer::Animated {
                    frames: frames
                        .iter()
                        .map(|frame| RenderFrame {
                            url: frame.url.clone(),
                            rect: frame.rect,
                        })
                        .collect(),
                }),
                other => resolve_layer_url(self.config.asset_base_url(), other).map(|url| {
                    RenderLayer::Static {
                        url,
                        rect: other.rect(),
                    }
                }),
            })
            .collect()
    }

    fn mark_done(&self, job_id: &str, url: String, format: String) {
        if let Some(mut entry) = self.jobs.get_mut(job_id) {
            entry.status = JobStatus::Done;
            entry.finished_at = Some(now_rfc3339());
            entry.url = Some(url);
            entry.format = Some(format);
        }
    }

    fn mark_error(&self, job_id: &str, message: String) {
        if let Some(mut entry) = self.jobs.get_mut(job_id) {
            entry.status = JobStatus::Error;
            entry.finished_at = Some(now_rfc3339());
            entry.error = Some(message);
        }
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::UNIX_EPOCH.to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{Rect, Size};

    fn config() -> AppConfig {
        AppConfig::parse_from(["render-service", "--asset-base-url", "https://cdn.example.com"])
    }

    fn payload() -> JobPayload {
        JobPayload {
            guild: "guild-a".to_owned(),
            user: "user-a".to_owned(),
            size: Size { width: 300, height: 300 },
            format: None,
            layers: vec![Layer::Floor {
                key: "wood".to_owned(),
                rect: Rect::default(),
            }],
            gif_options: None,
            background_color_hex: None,
        }
    }

    #[test]
    fn validate_rejects_empty_guild() {
        let mut payload = payload();
        payload.guild = String::new();
        assert_matches!(validate_payload(&payload, &config()), Err(ValidationError::MissingGuild));
    }

    #[test]
    fn validate_rejects_oversized_canvas() {
        let mut payload = payload();
        payload.size = Size { width: 5000, height: 300 };
        assert_matches!(
            validate_payload(&payload, &config()),
            Err(ValidationError::WidthExceedsMax { .. })
        );
    }

    #[test]
    fn validate_rejects_too_many_layers() {
        let mut payload = payload();
        let mut cfg = config();
        cfg.max_layers = 0;
        assert_matches!(
            validate_payload(&payload, &cfg),
            Err(ValidationError::TooManyLayers { .. })
        );
        payload.layers.clear();
        assert_eq!(Ok(()), validate_payload(&payload, &cfg));
    }

    #[test]
    fn validate_rejects_too_many_frames() {
        let mut payload = payload();
        payload.layers = vec![Layer::PetGifFrames {
            frames: (0..5)
                .map(|index| crate::model::GifFrameSpec {
                    url: format!("https://cdn.example.com/{index}.png"),
                    rect: Rect::default(),
                })
                .collect(),
        }];
        let mut cfg = config();
        cfg.max_frames = 2;
        assert_matches!(
            validate_payload(&payload, &cfg),
            Err(ValidationError::TooManyFrames { .. })
        );
    }
}
