use image::{Rgba, RgbaImage};

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn with_width(self, width: u32) -> Self {
        Self { width, ..self }
    }
}

/// Fills a rectangle whose four edges are joined by quarter-circle corners.
///
/// A pixel is painted when its center lies inside the shape. The radius is
/// clamped to half the shorter side, so very narrow fills degrade to a pill
/// and a zero-width rect paints nothing.
pub fn fill_rounded_rect(img: &mut RgbaImage, rect: Rect, radius: u32, color: Rgba<u8>) {
    if rect.width == 0 || rect.height == 0 {
        return;
    }

    let r = radius.min(rect.width / 2).min(rect.height / 2) as f32;
    let left = rect.x as f32;
    let top = rect.y as f32;
    let right = left + rect.width as f32;
    let bottom = top + rect.height as f32;

    // Corner arcs are centered on the inner rectangle
    let inner_left = left + r;
    let inner_right = right - r;
    let inner_top = top + r;
    let inner_bottom = bottom - r;

    let x0 = rect.x.max(0);
    let y0 = rect.y.max(0);
    let x1 = (rect.x + rect.width as i32).min(img.width() as i32);
    let y1 = (rect.y + rect.height as i32).min(img.height() as i32);

    for py in y0..y1 {
        let cy = py as f32 + 0.5;
        let dy = (inner_top - cy).max(cy - inner_bottom).max(0.0);
        for px in x0..x1 {
            let cx = px as f32 + 0.5;
            let dx = (inner_left - cx).max(cx - inner_right).max(0.0);
            if dx * dx + dy * dy <= r * r {
                img.put_pixel(px as u32, py as u32, color);
            }
        }
    }
}
