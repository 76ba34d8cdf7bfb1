//! Viewport and canvas: the visible window into layout coordinates.
//!
//! Layout coordinates are microns with y pointing up. Canvas coordinates are
//! pixels with the origin at the top-left corner and y pointing down.
//!
//! ```text
//!   canvas (w × h)                     layout space
//!   (0,0) ┌──────────────┐
//!         │              │            origin = layout point under the
//!         │      ●       │  ◄──────   canvas centre (w/2, h/2)
//!         │              │
//!         └──────────────┘ (w,h)      scale  = pixels per micron
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::geometry::BBox;

/// Largest accepted canvas edge in pixels.
pub const MAX_CANVAS_EDGE: u32 = 8192;

/// Fraction of the canvas a zoom-fit leaves covered by the layout.
const FIT_MARGIN: f64 = 0.95;

/// Rejected viewport or canvas values.
#[derive(Debug, Error, PartialEq)]
pub enum ViewportError {
    #[error("viewport origin must be finite, got ({x}, {y})")]
    NonFiniteOrigin { x: f64, y: f64 },

    #[error("viewport scale must be finite and > 0, got {0}")]
    InvalidScale(f64),

    #[error("canvas size must be between 1x1 and {max}x{max}, got {width}x{height}")]
    InvalidCanvas { width: u32, height: u32, max: u32 },
}

/// Visible window: layout point at the canvas centre plus zoom.
///
/// Construction through [`Viewport::new`] guarantees the invariant that all
/// values are finite and `scale > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    x: f64,
    y: f64,
    scale: f64,
}

impl Viewport {
    /// Validates and builds a viewport.
    ///
    /// # Errors
    ///
    /// [`ViewportError::NonFiniteOrigin`] or [`ViewportError::InvalidScale`].
    pub fn new(x: f64, y: f64, scale: f64) -> Result<Self, ViewportError> {
        if !x.is_finite() || !y.is_finite() {
            return Err(ViewportError::NonFiniteOrigin { x, y });
        }
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ViewportError::InvalidScale(scale));
        }
        Ok(Self { x, y, scale })
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Viewport that shows `bounds` centred with a small margin.
    ///
    /// An empty or degenerate box yields a unit-scale viewport centred on it
    /// (or on the origin when empty).
    pub fn fit(bounds: &BBox, canvas: Canvas) -> Self {
        if bounds.is_empty() {
            return Self::default();
        }
        let (cx, cy) = bounds.center();
        let (w, h) = (bounds.width(), bounds.height());
        let scale = if w <= 0.0 && h <= 0.0 {
            1.0
        } else {
            let sx = if w > 0.0 { f64::from(canvas.width) / w } else { f64::INFINITY };
            let sy = if h > 0.0 { f64::from(canvas.height) / h } else { f64::INFINITY };
            sx.min(sy) * FIT_MARGIN
        };
        Self::new(cx, cy, scale).unwrap_or_default()
    }

    /// Maps a layout point to canvas pixels.
    pub fn to_canvas(&self, canvas: Canvas, x: f64, y: f64) -> (f64, f64) {
        let px = (x - self.x) * self.scale + f64::from(canvas.width) / 2.0;
        let py = f64::from(canvas.height) / 2.0 - (y - self.y) * self.scale;
        (px, py)
    }

    /// Maps canvas pixels back to a layout point.
    pub fn to_layout(&self, canvas: Canvas, px: f64, py: f64) -> (f64, f64) {
        let x = (px - f64::from(canvas.width) / 2.0) / self.scale + self.x;
        let y = (f64::from(canvas.height) / 2.0 - py) / self.scale + self.y;
        (x, y)
    }

    /// Layout-space rectangle covered by `canvas`.
    pub fn visible_bounds(&self, canvas: Canvas) -> BBox {
        let (x1, y1) = self.to_layout(canvas, 0.0, 0.0);
        let (x2, y2) = self.to_layout(canvas, f64::from(canvas.width), f64::from(canvas.height));
        BBox::new(x1, y1, x2, y2)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, scale: 1.0 }
    }
}

/// Pixel dimensions of the client's drawing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    /// # Errors
    ///
    /// [`ViewportError::InvalidCanvas`] when either edge is 0 or larger than
    /// [`MAX_CANVAS_EDGE`].
    pub fn new(width: u32, height: u32) -> Result<Self, ViewportError> {
        let valid = |v: u32| (1..=MAX_CANVAS_EDGE).contains(&v);
        if !valid(width) || !valid(height) {
            return Err(ViewportError::InvalidCanvas {
                width,
                height,
                max: MAX_CANVAS_EDGE,
            });
        }
        Ok(Self { width, height })
    }

    /// Canvas rectangle in pixel coordinates.
    pub fn bounds(&self) -> BBox {
        BBox::new(0.0, 0.0, f64::from(self.width), f64::from(self.height))
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self { width: 800, height: 600 }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_accepts_finite_positive_scale() {
        let vp = Viewport::new(-12.5, 3.0, 0.25).unwrap();
        assert_eq!((vp.x(), vp.y(), vp.scale()), (-12.5, 3.0, 0.25));
    }

    #[test]
    fn test_new_rejects_zero_and_negative_scale() {
        assert_eq!(Viewport::new(0.0, 0.0, 0.0), Err(ViewportError::InvalidScale(0.0)));
        assert!(Viewport::new(0.0, 0.0, -1.0).is_err());
        assert!(Viewport::new(0.0, 0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_new_rejects_non_finite_origin() {
        assert!(matches!(
            Viewport::new(f64::NAN, 0.0, 1.0),
            Err(ViewportError::NonFiniteOrigin { .. })
        ));
        assert!(Viewport::new(0.0, f64::NEG_INFINITY, 1.0).is_err());
    }

    #[test]
    fn test_origin_maps_to_canvas_centre() {
        let canvas = Canvas::new(200, 100).unwrap();
        let vp = Viewport::new(10.0, 20.0, 2.0).unwrap();
        assert_eq!(vp.to_canvas(canvas, 10.0, 20.0), (100.0, 50.0));
        // One micron right and up moves two pixels right and two pixels up.
        assert_eq!(vp.to_canvas(canvas, 11.0, 21.0), (102.0, 48.0));
    }

    #[test]
    fn test_to_layout_inverts_to_canvas() {
        let canvas = Canvas::new(640, 480).unwrap();
        let vp = Viewport::new(-3.0, 7.5, 12.0).unwrap();
        let (px, py) = vp.to_canvas(canvas, 1.25, -4.0);
        let (x, y) = vp.to_layout(canvas, px, py);
        assert!((x - 1.25).abs() < 1e-9);
        assert!((y + 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_centres_and_scales_to_smaller_axis() {
        let canvas = Canvas::new(200, 100).unwrap();
        let vp = Viewport::fit(&BBox::new(0.0, 0.0, 10.0, 10.0), canvas);
        assert_eq!((vp.x(), vp.y()), (5.0, 5.0));
        assert!((vp.scale() - 10.0 * 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_fit_of_empty_box_is_default() {
        assert_eq!(Viewport::fit(&BBox::EMPTY, Canvas::default()), Viewport::default());
    }

    #[test]
    fn test_canvas_limits() {
        assert!(Canvas::new(0, 10).is_err());
        assert!(Canvas::new(10, MAX_CANVAS_EDGE + 1).is_err());
        assert!(Canvas::new(MAX_CANVAS_EDGE, 1).is_ok());
    }
}
