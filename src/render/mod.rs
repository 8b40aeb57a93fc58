//! Frame rendering for the key icon and the LCD strip.
//!
//! Everything here is a pure function of its inputs plus the layout
//! constants below: the same snapshot always produces the same bytes.

mod artwork;
pub mod shapes;

pub use artwork::ArtworkLoader;

use ab_glyph::{FontVec, PxScale};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::models::{PixelBuffer, PixelFormat, PlaybackSnapshot, RenderedFrame};
use shapes::{Rect, fill_rounded_rect};

pub const BAR_WIDTH_FRACTION: f64 = 0.5;
pub const BAR_HEIGHT_FRACTION: f64 = 0.1;
pub const CORNER_RADIUS: u32 = 3;
pub const FONT_SIZE: f32 = 15.0;

/// Baselines relative to the strip's vertical midpoint
const ARTIST_BASELINE: i32 = -10;
const TRACK_BASELINE: i32 = 20;
const TEXT_MARGIN: u32 = 8;

const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const TEXT_COLOR: Rgba<u8> = BLACK;
const TRACK_COLOR: Rgba<u8> = Rgba([200, 200, 200, 255]);
const FILL_COLOR: Rgba<u8> = BLACK;

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/noto/NotoSans-Regular.ttf",
    "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
    "/usr/share/fonts/google-noto/NotoSans-Regular.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
];

/// Pixel sizes of the two display targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub icon: (u32, u32),
    pub strip: (u32, u32),
}

pub struct Renderer {
    layout: Layout,
    font: Option<FontVec>,
    icon_format: PixelFormat,
    strip_format: PixelFormat,
}

impl Renderer {
    pub fn new(layout: Layout, font: Option<FontVec>) -> Self {
        Self {
            layout,
            font,
            icon_format: PixelFormat::Rgba,
            strip_format: PixelFormat::Rgba,
        }
    }

    pub fn with_formats(mut self, icon: PixelFormat, strip: PixelFormat) -> Self {
        self.icon_format = icon;
        self.strip_format = strip;
        self
    }

    pub fn render_frame(
        &self,
        snapshot: &PlaybackSnapshot,
        artwork: Option<&RgbaImage>,
    ) -> RenderedFrame {
        RenderedFrame {
            icon: self.render_icon(artwork).into_format(self.icon_format),
            bar: self.render_bar(snapshot).into_format(self.strip_format),
        }
    }

    /// Black square, with the artwork stretched over it when there is one.
    pub fn render_icon(&self, artwork: Option<&RgbaImage>) -> PixelBuffer {
        let (w, h) = self.layout.icon;
        let mut canvas = RgbaImage::from_pixel(w, h, BLACK);

        if let Some(art) = artwork {
            let scaled = imageops::resize(art, w, h, FilterType::Triangle);
            imageops::replace(&mut canvas, &scaled, 0, 0);
        }

        PixelBuffer::from_rgba(w, h, canvas.into_raw())
    }

    pub fn render_bar(&self, snapshot: &PlaybackSnapshot) -> PixelBuffer {
        let (w, h) = self.layout.strip;
        let mut canvas = RgbaImage::from_pixel(w, h, WHITE);
        let mid = (h / 2) as i32;

        if let Some(font) = &self.font {
            self.draw_centered(&mut canvas, font, &snapshot.artist, mid + ARTIST_BASELINE);
            self.draw_centered(&mut canvas, font, &snapshot.track, mid + TRACK_BASELINE);
        }

        let track = progress_track(w, h);
        fill_rounded_rect(&mut canvas, track, CORNER_RADIUS, TRACK_COLOR);

        if let Some(fill) = progress_fill_width(track.width, snapshot) {
            fill_rounded_rect(&mut canvas, track.with_width(fill), CORNER_RADIUS, FILL_COLOR);
        }

        PixelBuffer::from_rgba(w, h, canvas.into_raw())
    }

    fn draw_centered(&self, canvas: &mut RgbaImage, font: &FontVec, text: &str, baseline: i32) {
        if text.is_empty() {
            return;
        }

        let scale = PxScale::from(FONT_SIZE);
        let max_width = canvas.width().saturating_sub(TEXT_MARGIN * 2);
        let text = fit_text(font, text, max_width);
        let (text_w, _) = text_size(scale, font, &text);

        let x = (canvas.width() as i32 - text_w as i32) / 2;
        let y = baseline - FONT_SIZE as i32;
        draw_text_mut(canvas, TEXT_COLOR, x, y, scale, font, &text);
    }
}

/// The grey track: centered, `BAR_WIDTH_FRACTION` × `BAR_HEIGHT_FRACTION`
/// of the strip.
pub fn progress_track(strip_width: u32, strip_height: u32) -> Rect {
    let width = (strip_width as f64 * BAR_WIDTH_FRACTION).round() as u32;
    let height = ((strip_height as f64 * BAR_HEIGHT_FRACTION).round() as u32).max(1);
    Rect::new(
        ((strip_width - width) / 2) as i32,
        ((strip_height - height) / 2) as i32,
        width,
        height,
    )
}

/// Width of the filled part, or `None` when the duration is unknown.
pub fn progress_fill_width(track_width: u32, snapshot: &PlaybackSnapshot) -> Option<u32> {
    let ratio = snapshot.progress_ratio()?;
    Some((track_width as f64 * ratio).round() as u32)
}

/// Shortens `text` with an ellipsis until it fits in `max_width` pixels.
fn fit_text(font: &FontVec, text: &str, max_width: u32) -> String {
    let scale = PxScale::from(FONT_SIZE);
    if text_size(scale, font, text).0 <= max_width {
        return text.to_string();
    }

    let mut chars: Vec<char> = text.chars().collect();
    while !chars.is_empty() {
        chars.pop();
        let candidate: String = chars.iter().collect::<String>() + "…";
        if text_size(scale, font, &candidate).0 <= max_width {
            return candidate;
        }
    }
    String::new()
}

/// Loads the configured font, falling back to common system locations.
///
/// Without a font the strip still shows the progress bar, just no text.
pub fn load_font(configured: Option<&Path>) -> Option<FontVec> {
    let candidates: Vec<PathBuf> = match configured {
        Some(path) => vec![path.to_path_buf()],
        None => FONT_CANDIDATES.iter().map(PathBuf::from).collect(),
    };

    for path in candidates {
        let Ok(bytes) = std::fs::read(&path) else {
            continue;
        };
        match FontVec::try_from_vec(bytes) {
            Ok(font) => {
                info!("Using font {}", path.display());
                return Some(font);
            }
            Err(e) => warn!("Failed to parse font {}: {e}", path.display()),
        }
    }

    warn!("No usable font found, artist and track text will not be drawn");
    None
}
