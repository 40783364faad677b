//! Frame compositor (§4.4): draws layers onto a canvas, producing a single
//! PNG or a multi-frame GIF.

use std::collections::HashSet;
use std::io::Cursor;
use std::sync::Arc;

use image::imageops::{overlay, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use tracing::warn;

use crate::cache::TtlCache;
use crate::concurrency::bounded_map;
use crate::decode::DecoderCache;
use crate::error::CompositorError;
use crate::fetch::AssetFetcher;
use crate::model::{GifOptions, Rect, ResolvedRect};

const MAX_PALETTE_COLOURS: usize = 256;
const MIN_GIF_DELAY_CENTISECONDS: u16 = 1;

/// A layer resolved to concrete source URLs, ready for compositing.
#[derive(Debug, Clone)]
pub enum RenderLayer {
    /// A single bitmap drawn once (or, inside `compose_gif`, on every frame).
    Static { url: String, rect: Rect },
    /// An ordered sequence of frames drawn with modular indexing.
    Animated { frames: Vec<RenderFrame> },
}

#[derive(Debug, Clone)]
pub struct RenderFrame {
    pub url: String,
    pub rect: Rect,
}

/// Either a finished PNG or a finished GIF, as produced by [`compose_gif`]
/// when it downgrades due to a lack of surviving animated layers.
pub struct ComposeOutput {
    pub format: &'static str,
    pub bytes: Vec<u8>,
}

async fn fetch_decode(
    fetcher: &AssetFetcher,
    decoder: &DecoderCache,
    url: &str,
) -> Option<DynamicImage> {
    let bytes = match fetcher.fetch_with_extension_fallback(url).await {
        Ok(bytes) => bytes,
        Err(error) => {
            warn!(url, %error, "layer asset fetch failed, skipping layer");
            return None;
        }
    };
    match decoder.decode(url, &bytes) {
        Ok(image) => Some(image),
        Err(error) => {
            warn!(url, %error, "layer asset decode failed, skipping layer");
            None
        }
    }
}

fn parse_hex_color(hex: &str) -> Option<Rgba<u8>> {
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(Rgba([r, g, b, 0xFF]))
}

fn fill_canvas(canvas: &mut RgbaImage, background_color_hex: Option<&str>) {
    let fill = background_color_hex
        .and_then(parse_hex_color)
        .unwrap_or(Rgba([0, 0, 0, 0]));
    for pixel in canvas.pixels_mut() {
        *pixel = fill;
    }
}

fn draw_into(canvas: &mut RgbaImage, image: &DynamicImage, rect: ResolvedRect) {
    if rect.w == 0 || rect.h == 0 {
        return;
    }
    let resized = image.resize_exact(rect.w, rect.h, FilterType::Triangle);
    overlay(canvas, &resized.to_rgba8(), rect.x, rect.y);
}

/// Composites `layers` onto a `width`×`height` canvas and encodes as PNG.
/// Per-layer fetch/decode failures are swallowed (§7): the layer is skipped,
/// the job still succeeds.
pub async fn compose_png(
    width: u32,
    height: u32,
    layers: &[RenderLayer],
    background_color_hex: Option<&str>,
    fetcher: &Arc<AssetFetcher>,
    decoder: &Arc<DecoderCache>,
    fetch_concurrency: usize,
) -> Result<Vec<u8>, CompositorError> {
    let resolved = resolve_static_frame(layers, fetcher, decoder, fetch_concurrency).await;
    encode_png_from_resolved(width, height, &resolved, background_color_hex)
}

/// Resolves each layer to a single `(image, rect)` pair — for `Animated`
/// layers this takes only the first surviving frame, since a PNG has no
/// notion of time.
async fn resolve_static_frame(
    layers: &[RenderLayer],
    fetcher: &Arc<AssetFetcher>,
    decoder: &Arc<DecoderCache>,
    fetch_concurrency: usize,
) -> Vec<Option<(DynamicImage, Rect)>> {
    let items: Vec<RenderLayer> = layers.to_vec();
    let fetcher = Arc::clone(fetcher);
    let decoder = Arc::clone(decoder);
    bounded_map(items, fetch_concurrency.max(1), move |layer| {
        let fetcher = Arc::clone(&fetcher);
        let decoder = Arc::clone(&decoder);
        async move {
            let (url, rect) = match &layer {
                RenderLayer::Static { url, rect } => (url.clone(), *rect),
                RenderLayer::Animated { frames } => {
                    let first = frames.first()?;
                    (first.url.clone(), first.rect)
                }
            };
            let image = fetch_decode(&fetcher, &decoder, &url).await?;
            Some((image, rect))
        }
    })
    .await
}

fn encode_png_from_resolved(
    width: u32,
    height: u32,
    resolved: &[Option<(DynamicImage, Rect)>],
    background_color_hex: Option<&str>,
) -> Result<Vec<u8>, CompositorError> {
    let mut canvas = RgbaImage::new(width, height);
    fill_canvas(&mut canvas, background_color_hex);

    for entry in resolved {
        if let Some((image, rect)) = entry {
            draw_into(&mut canvas, image, rect.resolve(width, height));
        }
    }

    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(CompositorError::Encode)?;
    Ok(bytes)
}

enum ResolvedLayer {
    Static { image: DynamicImage, rect: ResolvedRect },
    Animated { frames: Vec<(DynamicImage, ResolvedRect)> },
}

/// Composites `layers` into an animated GIF, or downgrades to a PNG (§4.4
/// step 2) if no animated layer survives asset resolution.
pub async fn compose_gif(
    width: u32,
    height: u32,
    layers: &[RenderLayer],
    gif_options: Option<&GifOptions>,
    default_delay_ms: u32,
    fetcher: &Arc<AssetFetcher>,
    decoder: &Arc<DecoderCache>,
    frame_fetch_concurrency: usize,
) -> Result<ComposeOutput, CompositorError> {
    let mut resolved_layers = Vec::with_capacity(layers.len());
    for layer in layers {
        match layer {
            RenderLayer::Static { url, rect } => {
                if let Some(image) = fetch_decode(fetcher, decoder, url).await {
                    resolved_layers.push(ResolvedLayer::Static {
                        image,
                        rect: rect.resolve(width, height),
                    });
                }
            }
            RenderLayer::Animated { frames } => {
                let items: Vec<RenderFrame> = frames.clone();
                let frame_fetcher = Arc::clone(fetcher);
                let frame_decoder = Arc::clone(decoder);
                let decoded = bounded_map(items, frame_fetch_concurrency.max(1), move |frame| {
                    let fetcher = Arc::clone(&frame_fetcher);
                    let decoder = Arc::clone(&frame_decoder);
                    async move {
                        let image = fetch_decode(&fetcher, &decoder, &frame.url).await?;
                        Some((image, frame.rect.resolve(width, height)))
                    }
                })
                .await;
                let survivors: Vec<(DynamicImage, ResolvedRect)> =
                    decoded.into_iter().flatten().collect();
                if !survivors.is_empty() {
                    resolved_layers.push(ResolvedLayer::Animated { frames: survivors });
                }
            }
        }
    }

    let frame_count = resolved_layers
        .iter()
        .filter_map(|layer| match layer {
            ResolvedLayer::Animated { frames } => Some(frames.len()),
            ResolvedLayer::Static { .. } => None,
        })
        .max()
        .unwrap_or(0);

    if frame_count == 0 {
        let resolved: Vec<Option<(DynamicImage, Rect)>> = resolved_layers
            .into_iter()
            .filter_map(|layer| match layer {
                ResolvedLayer::Static { image, rect } => Some(Some((
                    image,
                    Rect {
                        x: Some(rect.x),
                        y: Some(rect.y),
                        w: Some(i64::from(rect.w)),
                        h: Some(i64::from(rect.h)),
                    },
                ))),
                ResolvedLayer::Animated { .. } => None,
            })
            .collect();
        let background_color_hex = gif_options.and_then(|o| o.background_color_hex.as_deref());
        let bytes = encode_png_from_resolved(width, height, &resolved, background_color_hex)?;
        return Ok(ComposeOutput { format: "png", bytes });
    }

    encode_gif(width, height, &resolved_layers, frame_count, gif_options, default_delay_ms)
}

fn encode_gif(
    width: u32,
    height: u32,
    layers: &[ResolvedLayer],
    frame_count: usize,
    gif_options: Option<&GifOptions>,
    default_delay_ms: u32,
) -> Result<ComposeOutput, CompositorError> {
    let delay_ms = gif_options.and_then(|o| o.delay_ms).unwrap_or(default_delay_ms);
    let delay_centiseconds = (delay_ms / 10).max(u32::from(MIN_GIF_DELAY_CENTISECONDS)) as u16;
    let repeat = gif_options.and_then(|o| o.repeat).unwrap_or(0);
    let quality = gif_options.and_then(|o| o.quality).unwrap_or(10).clamp(1, 30);
    let transparent = gif_options.and_then(|o| o.transparent).unwrap_or(false);
    let transparent_color = gif_options
        .and_then(|o| o.transparent_color_hex.as_deref())
        .and_then(parse_hex_color);
    let background_color_hex = gif_options.and_then(|o| o.background_color_hex.as_deref());

    let mut rgba_frames = Vec::with_capacity(frame_count);
    for index in 0..frame_count {
        let mut canvas = RgbaImage::new(width, height);
        fill_canvas(&mut canvas, background_color_hex);
        for layer in layers {
            match layer {
                ResolvedLayer::Static { image, rect } => draw_into(&mut canvas, image, *rect),
                ResolvedLayer::Animated { frames } => {
                    let (image, rect) = &frames[index % frames.len()];
                    draw_into(&mut canvas, image, *rect);
                }
            }
        }
        rgba_frames.push(canvas);
    }

    let palette = SharedPalette::build(&rgba_frames, quality);
    let transparent_index = if transparent {
        transparent_color.map(|colour| palette.nearest_index(&[colour.0[0], colour.0[1], colour.0[2], 0xFF]))
    } else {
        None
    };

    let mut bytes = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut bytes, width as u16, height as u16, &[])
            .map_err(CompositorError::GifEncode)?;
        encoder
            .set_repeat(if repeat == 0 {
                gif::Repeat::Infinite
            } else {
                gif::Repeat::Finite(repeat.max(0) as u16)
            })
            .map_err(CompositorError::GifEncode)?;

        for canvas in &rgba_frames {
            let indexed = palette.index_pixels(canvas.as_raw());
            let mut frame = gif::Frame::from_palette_pixels(
                width as u16,
                height as u16,
                indexed,
                palette.palette_bytes().to_vec(),
                transparent_index,
            );
            frame.delay = delay_centiseconds;
            frame.dispose = gif::DisposalMethod::Background;
            encoder.write_frame(&frame).map_err(CompositorError::GifEncode)?;
        }
    }

    Ok(ComposeOutput { format: "gif", bytes })
}

/// A single RGB palette shared across every frame, built once up front so
/// there is no per-frame palette flicker.
enum SharedPalette {
    Exact {
        palette_bytes: Vec<u8>,
        lookup: std::collections::HashMap<[u8; 4], u8>,
    },
    Quantised {
        palette_bytes: Vec<u8>,
        quantiser: color_quant::NeuQuant,
    },
}

impl SharedPalette {
    fn build(frames: &[RgbaImage], quality: i32) -> Self {
        let mut unique = HashSet::new();
        for frame in frames {
            for pixel in frame.chunks_exact(4) {
                unique.insert([pixel[0], pixel[1], pixel[2], pixel[3]]);
                if unique.len() > MAX_PALETTE_COLOURS {
                    return Self::build_quantised(frames, quality);
                }
            }
        }

        let mut colours: Vec<[u8; 4]> = unique.into_iter().collect();
        colours.sort_unstable();
        let palette_bytes = colours
            .iter()
            .flat_map(|colour| [colour[0], colour[1], colour[2]])
            .collect();
        let mut lookup = std::collections::HashMap::with_capacity(colours.len());
        for (index, colour) in colours.into_iter().enumerate() {
            let index = u8::try_from(index).expect("palette bounded by MAX_PALETTE_COLOURS");
            lookup.insert(colour, index);
        }
        Self::Exact { palette_bytes, lookup }
    }

    fn build_quantised(frames: &[RgbaImage], quality: i32) -> Self {
        let total_len: usize = frames.iter().map(|frame| frame.as_raw().len()).sum();
        let mut sampled = Vec::with_capacity(total_len);
        for frame in frames {
            sampled.extend_from_slice(frame.as_raw());
        }
        let quantiser = color_quant::NeuQuant::new(quality, MAX_PALETTE_COLOURS, &sampled);
        let palette_bytes = quantiser.color_map_rgb();
        Self::Quantised { palette_bytes, quantiser }
    }

    fn palette_bytes(&self) -> &[u8] {
        match self {
            Self::Exact { palette_bytes, .. } | Self::Quantised { palette_bytes, .. } => {
                palette_bytes
            }
        }
    }

    fn index_pixels(&self, rgba_pixels: &[u8]) -> Vec<u8> {
        match self {
            Self::Exact { lookup, .. } => rgba_pixels
                .chunks_exact(4)
                .map(|pixel| {
                    let key = [pixel[0], pixel[1], pixel[2], pixel[3]];
                    lookup.get(&key).copied().unwrap_or_default()
                })
                .collect(),
            Self::Quantised { quantiser, .. } => rgba_pixels
                .chunks_exact(4)
                .map(|pixel| quantiser.index_of(pixel) as u8)
                .collect(),
        }
    }

    fn nearest_index(&self, rgba_pixel: &[u8; 4]) -> u8 {
        match self {
            Self::Exact { lookup, palette_bytes } => {
                if let Some(index) = lookup.get(rgba_pixel) {
                    return *index;
                }
                nearest_in_palette(palette_bytes, rgba_pixel)
            }
            Self::Quantised { quantiser, .. } => quantiser.index_of(rgba_pixel) as u8,
        }
    }
}

fn nearest_in_palette(palette_bytes: &[u8], target: &[u8; 4]) -> u8 {
    palette_bytes
        .chunks_exact(3)
        .enumerate()
        .min_by_key(|(_, rgb)| {
            let dr = i32::from(rgb[0]) - i32::from(target[0]);
            let dg = i32::from(rgb[1]) - i32::from(target[1]);
            let db = i32::from(rgb[2]) - i32::from(target[2]);
            dr * dr + dg * dg + db * db
        })
        .map(|(index, _)| index as u8)
        .unwrap_or_default()
}
