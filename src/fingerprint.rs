//! Job fingerprinting (§4.5): a stable SHA-1 hex of the normalized job,
//! invariant to `guild`, `user`, and unknown/alias fields, but sensitive to
//! layer order and anything else that affects pixels.

use serde::Serialize;
use sha1::{Digest, Sha1};

use crate::model::{GifFrameSpec, GifOptions, JobPayload, Layer, Rect, Size};

/// Canonical, hashable view of the pixel-affecting parts of a job. Field
/// order here is exactly the serialized key order — `serde_json` preserves
/// struct declaration order, so this struct's shape *is* the canonical form.
#[derive(Serialize)]
struct NormalizedJob {
    size: Size,
    format: Option<&'static str>,
    layers: Vec<NormalizedLayer>,
    gif_options: NormalizedGifOptions,
    background_color_hex: Option<String>,
}

#[derive(Serialize)]
struct NormalizedRect {
    x: i64,
    y: i64,
    w: Option<i64>,
    h: Option<i64>,
}

impl From<Rect> for NormalizedRect {
    fn from(rect: Rect) -> Self {
        Self {
            x: rect.x.unwrap_or(0),
            y: rect.y.unwrap_or(0),
            w: rect.w,
            h: rect.h,
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum NormalizedLayer {
    #[serde(rename = "background")]
    Background { key: String, rect: NormalizedRect },
    #[serde(rename = "room-bg")]
    RoomBg { key: String, rect: NormalizedRect },
    #[serde(rename = "floor")]
    Floor { key: String, rect: NormalizedRect },
    #[serde(rename = "furniture")]
    Furniture { key: String, rect: NormalizedRect },
    #[serde(rename = "wallpaper-left")]
    WallpaperLeft { key: String, rect: NormalizedRect },
    #[serde(rename = "wallpaper-right")]
    WallpaperRight { key: String, rect: NormalizedRect },
    #[serde(rename = "static")]
    Static { url: String, rect: NormalizedRect },
    #[serde(rename = "pet_gif_frames")]
    PetGifFrames { frames: Vec<NormalizedFrame> },
}

#[derive(Serialize)]
struct NormalizedFrame {
    url: String,
    rect: NormalizedRect,
}

#[derive(Serialize)]
struct NormalizedGifOptions {
    delay_ms: u32,
    repeat: i32,
    quality: i32,
    transparent: bool,
    transparent_color_hex: Option<String>,
    background_color_hex: Option<String>,
}

impl From<&Layer> for NormalizedLayer {
    fn from(layer: &Layer) -> Self {
        match layer {
            Layer::Background { key, rect } => Self::Background {
                key: key.to_lowercase(),
                rect: (*rect).into(),
            },
            Layer::RoomBg { key, rect } => Self::RoomBg {
                key: key.to_lowercase(),
                rect: (*rect).into(),
            },
            Layer::Floor { key, rect } => Self::Floor {
                key: key.to_lowercase(),
                rect: (*rect).into(),
            },
            Layer::Furniture { key, rect } => Self::Furniture {
                key: key.to_lowercase(),
                rect: (*rect).into(),
            },
            Layer::WallpaperLeft { key, rect } => Self::WallpaperLeft {
                key: key.to_lowercase(),
                rect: (*rect).into(),
            },
            Layer::WallpaperRight { key, rect } => Self::WallpaperRight {
                key: key.to_lowercase(),
                rect: (*rect).into(),
            },
            Layer::Static { url, rect } => Self::Static {
                url: url.to_lowercase(),
                rect: (*rect).into(),
            },
            Layer::PetGifFrames { frames } => Self::PetGifFrames {
                frames: frames.iter().map(NormalizedFrame::from).collect(),
            },
        }
    }
}

impl From<&GifFrameSpec> for NormalizedFrame {
    fn from(frame: &GifFrameSpec) -> Self {
        Self {
            url: frame.url.to_lowercase(),
            rect: frame.rect.into(),
        }
    }
}

impl NormalizedGifOptions {
    /// `default_delay_ms` is the process's configured GIF frame delay
    /// default (§6 `DEFAULT_GIF_DELAY_MS`), used whenever a job omits
    /// `gifOptions.delayMs` — the same default the compositor falls back to,
    /// so the fingerprint always reflects the delay that will actually render.
    fn from_options(options: Option<&GifOptions>, default_delay_ms: u32) -> Self {
        Self {
            delay_ms: options.and_then(|o| o.delay_ms).unwrap_or(default_delay_ms),
            repeat: options.and_then(|o| o.repeat).unwrap_or(0),
            quality: options.and_then(|o| o.quality).unwrap_or(10),
            transparent: options.and_then(|o| o.transparent).unwrap_or(false),
            transparent_color_hex: options.and_then(|o| o.transparent_color_hex.clone()),
            background_color_hex: options.and_then(|o| o.background_color_hex.clone()),
        }
    }
}

/// Computes the SHA-1 hex fingerprint of `payload`'s pixel-affecting fields.
/// `default_gif_delay_ms` is the process's configured default (§6), used to
/// resolve an omitted `gifOptions.delayMs` the same way the compositor does.
#[must_use]
pub fn fingerprint(payload: &JobPayload, default_gif_delay_ms: u32) -> String {
    let normalized = NormalizedJob {
        size: payload.size,
        format: payload.format.map(|format| match format {
            crate::model::OutputFormat::Gif => "gif",
            crate::model::OutputFormat::Png => "png",
        }),
        layers: payload.layers.iter().map(NormalizedLayer::from).collect(),
        gif_options: NormalizedGifOptions::from_options(
            payload.gif_options.as_ref(),
            default_gif_delay_ms,
        ),
        background_color_hex: payload
            .background_color_hex
            .as_ref()
            .map(|hex| hex.to_lowercase()),
    };

    let canonical_json =
        serde_json::to_vec(&normalized).expect("normalized job is always serializable");
    let digest = Sha1::digest(&canonical_json);
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::{assert_eq, assert_ne};

    use super::*;
    use crate::model::Size;

    const DEFAULT_DELAY_MS: u32 = 180;

    fn base_payload() -> JobPayload {
        JobPayload {
            guild: "guild-a".to_owned(),
            user: "user-a".to_owned(),
            size: Size { width: 300, height: 300 },
            format: None,
            layers: vec![
                Layer::Background { key: String::new(), rect: Rect::default() },
                Layer::Floor { key: "Wood 01".to_owned(), rect: Rect::default() },
            ],
            gif_options: None,
            background_color_hex: None,
        }
    }

    #[test]
    fn fingerprint_is_stable_for_identical_payload() {
        let payload = base_payload();
        assert_eq!(fingerprint(&payload, DEFAULT_DELAY_MS), fingerprint(&payload, DEFAULT_DELAY_MS));
    }

    #[test]
    fn fingerprint_ignores_guild_and_user() {
        let mut other = base_payload();
        other.guild = "guild-b".to_owned();
        other.user = "user-b".to_owned();
        assert_eq!(fingerprint(&base_payload(), DEFAULT_DELAY_MS), fingerprint(&other, DEFAULT_DELAY_MS));
    }

    #[test]
    fn fingerprint_differs_on_layer_order() {
        let mut reordered = base_payload();
        reordered.layers.reverse();
        assert_ne!(fingerprint(&base_payload(), DEFAULT_DELAY_MS), fingerprint(&reordered, DEFAULT_DELAY_MS));
    }

    #[test]
    fn fingerprint_differs_on_size() {
        let mut resized = base_payload();
        resized.size = Size { width: 400, height: 400 };
        assert_ne!(fingerprint(&base_payload(), DEFAULT_DELAY_MS), fingerprint(&resized, DEFAULT_DELAY_MS));
    }

    #[test]
    fn fingerprint_is_case_insensitive_on_keys() {
        let mut upper = base_payload();
        upper.layers[1] = Layer::Floor {
            key: "WOOD 01".to_owned(),
            rect: Rect::default(),
        };
        assert_eq!(fingerprint(&base_payload(), DEFAULT_DELAY_MS), fingerprint(&upper, DEFAULT_DELAY_MS));
    }
}
