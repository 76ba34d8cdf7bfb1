//! Software rasteriser for RGBA frames.
//!
//! Only what a layout viewer needs: even-odd polygon fill with stipple
//! patterns, thick polylines, and alpha blending onto an opaque background.
//! All coordinates are canvas pixels (origin top-left, y down).

use crate::domain::color::Rgba;

/// Returns whether stipple `pattern` paints pixel `(x, y)`.
///
/// | pattern | look                       |
/// |---------|----------------------------|
/// | 0       | solid                      |
/// | 1       | hollow (outline only)      |
/// | 2       | checkerboard               |
/// | 3       | sparse dots (1 in 16)      |
/// | 4       | diagonal lines `/`         |
/// | 5       | diagonal lines `\`         |
/// | 6       | horizontal lines           |
/// | 7       | vertical lines             |
/// | 8       | cross-hatch                |
/// | 9       | dense dots (1 in 4)        |
///
/// Higher indices wrap onto 2..=9.
pub fn dither_hit(pattern: u8, x: u32, y: u32) -> bool {
    let (xi, yi) = (i64::from(x), i64::from(y));
    match pattern {
        0 => true,
        1 => false,
        2 => (x + y) % 2 == 0,
        3 => x % 4 == 0 && y % 4 == 0,
        4 => (xi + yi) % 4 == 0,
        5 => (xi - yi).rem_euclid(4) == 0,
        6 => y % 4 == 0,
        7 => x % 4 == 0,
        8 => x % 4 == 0 || y % 4 == 0,
        9 => x % 2 == 0 && y % 2 == 0,
        p => dither_hit(2 + (p - 10) % 8, x, y),
    }
}

/// An RGBA8 pixel buffer, row-major, 4 bytes per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RgbaImage {
    /// A `width × height` image filled with `background`.
    pub fn new(width: u32, height: u32, background: Rgba) -> Self {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * 4);
        for _ in 0..count {
            pixels.extend_from_slice(&[background.r, background.g, background.b, background.a]);
        }
        Self { width, height, pixels }
    }

    /// Wraps an existing buffer; `None` when the length is not `w * h * 4`.
    pub fn from_raw(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        (pixels.len() == width as usize * height as usize * 4).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = self.offset(x, y);
        Some(Rgba {
            r: self.pixels[i],
            g: self.pixels[i + 1],
            b: self.pixels[i + 2],
            a: self.pixels[i + 3],
        })
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    /// Source-over blend of `color` onto one pixel. Out-of-range is a no-op.
    pub fn blend(&mut self, x: i64, y: i64, color: Rgba) {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return;
        }
        let i = self.offset(x as u32, y as u32);
        let a = u32::from(color.a);
        let mix = |src: u8, dst: u8| ((u32::from(src) * a + u32::from(dst) * (255 - a) + 127) / 255) as u8;
        self.pixels[i] = mix(color.r, self.pixels[i]);
        self.pixels[i + 1] = mix(color.g, self.pixels[i + 1]);
        self.pixels[i + 2] = mix(color.b, self.pixels[i + 2]);
        self.pixels[i + 3] = self.pixels[i + 3].max(color.a);
    }

    /// Even-odd fill sampled at pixel centres, masked by a stipple pattern.
    pub fn fill_polygon(&mut self, points: &[(f64, f64)], color: Rgba, pattern: u8) {
        if points.len() < 3 || pattern == 1 {
            return;
        }
        let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
        for &(_, y) in points {
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
        let first_row = (min_y.floor().max(0.0)) as i64;
        let last_row = (max_y.ceil().min(f64::from(self.height))) as i64;
        let max_x = f64::from(self.width);
        let mut crossings: Vec<f64> = Vec::new();

        for row in first_row..last_row {
            let yc = row as f64 + 0.5;
            crossings.clear();
            for (i, &(x0, y0)) in points.iter().enumerate() {
                let (x1, y1) = points[(i + 1) % points.len()];
                if (y0 <= yc && y1 > yc) || (y1 <= yc && y0 > yc) {
                    crossings.push(x0 + (yc - y0) / (y1 - y0) * (x1 - x0));
                }
            }
            crossings.sort_by(f64::total_cmp);
            for pair in crossings.chunks_exact(2) {
                // Pixel px is inside when its centre px + 0.5 lies in [a, b).
                let start = (pair[0] - 0.5).ceil().clamp(0.0, max_x) as i64;
                let end = (pair[1] - 0.5).ceil().clamp(0.0, max_x) as i64;
                for px in start..end {
                    if dither_hit(pattern, px as u32, row as u32) {
                        self.blend(px, row, color);
                    }
                }
            }
        }
    }

    /// Strokes a polyline `width` pixels thick. `closed` joins last to first.
    pub fn stroke_polyline(&mut self, points: &[(f64, f64)], closed: bool, color: Rgba, width: u16) {
        if points.is_empty() {
            return;
        }
        if points.len() == 1 {
            self.stamp(points[0].0, points[0].1, color, width);
            return;
        }
        let segments = if closed { points.len() } else { points.len() - 1 };
        for i in 0..segments {
            let a = points[i];
            let b = points[(i + 1) % points.len()];
            self.stroke_segment(a, b, color, width);
        }
    }

    fn stroke_segment(&mut self, a: (f64, f64), b: (f64, f64), color: Rgba, width: u16) {
        let pad = f64::from(width);
        let clip = (
            -pad,
            -pad,
            f64::from(self.width) + pad,
            f64::from(self.height) + pad,
        );
        let Some(((x0, y0), (x1, y1))) = clip_segment(a, b, clip) else {
            return;
        };
        let steps = (x1 - x0).abs().max((y1 - y0).abs()).ceil().max(1.0) as usize;
        for s in 0..=steps {
            let t = s as f64 / steps as f64;
            self.stamp(x0 + (x1 - x0) * t, y0 + (y1 - y0) * t, color, width);
        }
    }

    /// Paints a `width × width` square centred on `(x, y)`.
    ///
    /// Overlapping stamps along one segment repaint the same pixels, so the
    /// pen is opaque-ish for translucent colors; layer outlines use opaque
    /// colors and this is not noticeable.
    fn stamp(&mut self, x: f64, y: f64, color: Rgba, width: u16) {
        let w = i64::from(width.max(1));
        let left = (x - w as f64 / 2.0).round() as i64;
        let top = (y - w as f64 / 2.0).round() as i64;
        // Only the part of the square that lands on the canvas is visited.
        let xs = left.max(0)..(left + w).min(i64::from(self.width));
        let ys = top.max(0)..(top + w).min(i64::from(self.height));
        for py in ys {
            for px in xs.clone() {
                self.put(px, py, color);
            }
        }
    }

    /// Writes a pixel without blending against itself twice: opaque colors
    /// replace, translucent colors blend.
    fn put(&mut self, x: i64, y: i64, color: Rgba) {
        if color.a == 0xff {
            if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
                return;
            }
            let i = self.offset(x as u32, y as u32);
            self.pixels[i..i + 4].copy_from_slice(&[color.r, color.g, color.b, color.a]);
        } else {
            self.blend(x, y, color);
        }
    }
}

/// Liang–Barsky clip of segment `a → b` against `(min_x, min_y, max_x, max_y)`.
fn clip_segment(
    a: (f64, f64),
    b: (f64, f64),
    (min_x, min_y, max_x, max_y): (f64, f64, f64, f64),
) -> Option<((f64, f64), (f64, f64))> {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;
    for (p, q) in [
        (-dx, a.0 - min_x),
        (dx, max_x - a.0),
        (-dy, a.1 - min_y),
        (dy, max_y - a.1),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    Some((
        (a.0 + t0 * dx, a.1 + t0 * dy),
        (a.0 + t1 * dx, a.1 + t1 * dy),
    ))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
