//! Violation markers and their display categories.
//!
//! A [`MarkerCategory`] is an immutable style value; an [`ItemMarkerGroup`]
//! is the mutable list of markers drawn with one category. The renderer
//! composites groups in order, so later groups paint over earlier ones.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::color::{ColorError, Rgba};
use crate::domain::geometry::BBox;
use crate::domain::layer::MAX_LINE_WIDTH;

/// Default stipple for marker fills.
pub const DEFAULT_DITHER_PATTERN: u8 = 5;
/// Default outline width in device-independent pixels.
pub const DEFAULT_LINE_WIDTH: u16 = 1;
/// Halo width meaning "no halo".
pub const NO_HALO: i16 = -1;
/// Widest halo drawn around a marker outline.
pub const MAX_HALO: i16 = 32;
/// Default marker color.
pub const DEFAULT_COLOR: &str = "red";

/// Rejected category settings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CategoryError {
    #[error("line width must be in 1..=64, got {0}")]
    LineWidth(i32),

    #[error("halo must be in -1..=32, got {0}")]
    Halo(i32),

    #[error(transparent)]
    Color(#[from] ColorError),
}

/// Raw, partially specified category settings as found in configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryConfig {
    pub dither_pattern: Option<u8>,
    pub line_width: Option<i32>,
    pub halo: Option<i32>,
    pub color: Option<String>,
}

/// Display style of one class of violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MarkerCategory {
    dither_pattern: u8,
    line_width: u16,
    halo: i16,
    color: Rgba,
}

impl MarkerCategory {
    /// Resolves a config into a category, filling unset fields with defaults.
    ///
    /// # Errors
    ///
    /// [`CategoryError`] when a value is out of range or the color does not
    /// parse.
    pub fn from_config(config: &CategoryConfig) -> Result<Self, CategoryError> {
        let raw_width = config.line_width.unwrap_or(i32::from(DEFAULT_LINE_WIDTH));
        let line_width = u16::try_from(raw_width)
            .ok()
            .filter(|w| (1..=MAX_LINE_WIDTH).contains(w))
            .ok_or(CategoryError::LineWidth(raw_width))?;
        let raw_halo = config.halo.unwrap_or(i32::from(NO_HALO));
        let halo = i16::try_from(raw_halo)
            .ok()
            .filter(|h| (NO_HALO..=MAX_HALO).contains(h))
            .ok_or(CategoryError::Halo(raw_halo))?;
        let color = Rgba::parse(config.color.as_deref().unwrap_or(DEFAULT_COLOR))?;
        Ok(Self {
            dither_pattern: config.dither_pattern.unwrap_or(DEFAULT_DITHER_PATTERN),
            line_width,
            halo,
            color,
        })
    }

    pub fn dither_pattern(&self) -> u8 {
        self.dither_pattern
    }

    pub fn line_width(&self) -> u16 {
        self.line_width
    }

    /// Halo width in pixels, or `None` when disabled.
    pub fn halo(&self) -> Option<u16> {
        u16::try_from(self.halo).ok()
    }

    pub fn color(&self) -> Rgba {
        self.color
    }
}

impl Default for MarkerCategory {
    fn default() -> Self {
        Self {
            dither_pattern: DEFAULT_DITHER_PATTERN,
            line_width: DEFAULT_LINE_WIDTH,
            halo: NO_HALO,
            color: Rgba::opaque(0xff, 0x00, 0x00),
        }
    }
}

/// Marker geometry in layout microns.
///
/// Serialized with a `"type"` tag so the same shape appears in RDB files and
/// in vector frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MarkerShape {
    Box { x1: f64, y1: f64, x2: f64, y2: f64 },
    Polygon { points: Vec<(f64, f64)> },
    Edge { x1: f64, y1: f64, x2: f64, y2: f64 },
}

impl MarkerShape {
    /// `true` if every coordinate is finite and a polygon has three or more
    /// vertices.
    pub fn is_drawable(&self) -> bool {
        match self {
            MarkerShape::Box { x1, y1, x2, y2 } | MarkerShape::Edge { x1, y1, x2, y2 } => {
                [x1, y1, x2, y2].iter().all(|v| v.is_finite())
            }
            MarkerShape::Polygon { points } => {
                points.len() >= 3 && points.iter().all(|(x, y)| x.is_finite() && y.is_finite())
            }
        }
    }

    pub fn bbox(&self) -> BBox {
        match self {
            MarkerShape::Box { x1, y1, x2, y2 } | MarkerShape::Edge { x1, y1, x2, y2 } => {
                BBox::new(*x1, *y1, *x2, *y2)
            }
            MarkerShape::Polygon { points } => BBox::of_points(points.iter().copied()),
        }
    }
}

/// One violation marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub shape: MarkerShape,
    /// Index of the violation in its source database.
    pub violation_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Cell whose coordinate system `shape` is in. `None` draws in any cell.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<String>,
}

impl Marker {
    /// `true` if the marker belongs on a view of `cell`.
    pub fn shows_in(&self, cell: &str) -> bool {
        self.cell.as_deref().map_or(true, |own| own == cell)
    }
}

/// Ordered markers sharing one category.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemMarkerGroup {
    id: String,
    category: MarkerCategory,
    markers: Vec<Marker>,
}

impl ItemMarkerGroup {
    /// Creates an empty group. `id` is a stable name such as the rule name.
    pub fn new(id: impl Into<String>, category: MarkerCategory) -> Self {
        Self {
            id: id.into(),
            category,
            markers: Vec::new(),
        }
    }

    pub fn add(&mut self, marker: Marker) {
        self.markers.push(marker);
    }

    /// Drops every marker; the category and id stay.
    pub fn clear(&mut self) {
        self.markers.clear();
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn category(&self) -> &MarkerCategory {
        &self.category
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.id
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
