//! Wire/job data model: layers, jobs, gif options, and registry records.

use serde::{Deserialize, Serialize};

/// A draw rectangle in output pixels. Any field left unset inherits a
/// default resolved by the caller (layer rectangle, then full canvas).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: Option<i64>,
    pub y: Option<i64>,
    pub w: Option<i64>,
    pub h: Option<i64>,
}

impl Rect {
    /// Resolves this rectangle against a canvas size, defaulting `x`/`y` to 0
    /// and `w`/`h` to the full canvas.
    #[must_use]
    pub fn resolve(self, canvas_w: u32, canvas_h: u32) -> ResolvedRect {
        ResolvedRect {
            x: self.x.unwrap_or(0),
            y: self.y.unwrap_or(0),
            w: self.w.map_or(canvas_w, |w| w.max(0) as u32),
            h: self.h.map_or(canvas_h, |h| h.max(0) as u32),
        }
    }
}

/// A draw rectangle with every field resolved to a concrete value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRect {
    pub x: i64,
    pub y: i64,
    pub w: u32,
    pub h: u32,
}

/// One layer as submitted by a caller, before URL resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Layer {
    #[serde(rename = "background")]
    Background {
        #[serde(default)]
        key: String,
        #[serde(default)]
        rect: Rect,
    },
    #[serde(rename = "room-bg", alias = "room_bg", alias = "roomBg")]
    RoomBg {
        #[serde(default)]
        key: String,
        #[serde(default)]
        rect: Rect,
    },
    #[serde(rename = "floor")]
    Floor {
        #[serde(default)]
        key: String,
        #[serde(default)]
        rect: Rect,
    },
    #[serde(rename = "furniture")]
    Furniture {
        #[serde(default)]
        key: String,
        #[serde(default)]
        rect: Rect,
    },
    #[serde(
        rename = "wallpaper-left",
        alias = "wallpaper_left",
        alias = "wallpaperLeft"
    )]
    WallpaperLeft {
        #[serde(default)]
        key: String,
        #[serde(default)]
        rect: Rect,
    },
    #[serde(
        rename = "wallpaper-right",
        alias = "wallpaper_right",
        alias = "wallpaperRight"
    )]
    WallpaperRight {
        #[serde(default)]
        key: String,
        #[serde(default)]
        rect: Rect,
    },
    #[serde(rename = "static")]
    Static {
        url: String,
        #[serde(default)]
        rect: Rect,
    },
    #[serde(rename = "pet_gif_frames", alias = "pet-gif-frames", alias = "petGifFrames")]
    PetGifFrames { frames: Vec<GifFrameSpec> },
}

impl Layer {
    /// Returns the layer's draw rectangle, or the default (full canvas) for
    /// `pet_gif_frames`, which carries a rectangle per frame instead.
    #[must_use]
    pub fn rect(&self) -> Rect {
        match self {
            Self::Background { rect, .. }
            | Self::RoomBg { rect, .. }
            | Self::Floor { rect, .. }
            | Self::Furniture { rect, .. }
            | Self::WallpaperLeft { rect, .. }
            | Self::WallpaperRight { rect, .. }
            | Self::Static { rect, .. } => *rect,
            Self::PetGifFrames { .. } => Rect::default(),
        }
    }
}

/// One frame of a `pet_gif_frames` layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GifFrameSpec {
    pub url: String,
    #[serde(default)]
    pub rect: Rect,
}

/// Output canvas size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Default for Size {
    fn default() -> Self {
        Self {
            width: 300,
            height: 300,
        }
    }
}

/// Requested output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Gif,
    Png,
}

/// GIF-specific render options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GifOptions {
    #[serde(rename = "delayMs")]
    pub delay_ms: Option<u32>,
    pub repeat: Option<i32>,
    pub quality: Option<i32>,
    pub transparent: Option<bool>,
    #[serde(rename = "transparentColorHex")]
    pub transparent_color_hex: Option<String>,
    #[serde(rename = "backgroundColorHex")]
    pub background_color_hex: Option<String>,
}

/// A render job as submitted by a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    #[serde(default)]
    pub guild: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub size: Size,
    pub format: Option<OutputFormat>,
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(rename = "gifOptions", default)]
    pub gif_options: Option<GifOptions>,
    #[serde(rename = "backgroundColorHex")]
    pub background_color_hex: Option<String>,
}

/// Terminal/pending status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Done,
    Error,
}

/// Registry-owned record for one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub status: JobStatus,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "finishedAt", skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
