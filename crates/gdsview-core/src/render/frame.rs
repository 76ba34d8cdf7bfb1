//! Rendered frames and the requests that produce them.

use serde::{Deserialize, Serialize};

use crate::domain::color::Rgba;
use crate::domain::layer::{LayerKey, LayerStyle};
use crate::domain::marker::{ItemMarkerGroup, MarkerShape};
use crate::domain::viewport::{Canvas, Viewport};
use crate::render::raster::RgbaImage;

/// Background of raster frames.
pub const BACKGROUND: Rgba = Rgba::opaque(0x00, 0x00, 0x00);

/// Halo color drawn under marker outlines.
const HALO_COLOR: Rgba = Rgba::opaque(0xff, 0xff, 0xff);

/// How a frame's pixels travel to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    /// RGBA8 image.
    #[default]
    Raster,
    /// List of canvas-space primitives the client draws itself.
    Vector,
}

impl FrameFormat {
    /// Byte used for this format in the frame codec header.
    pub fn wire_id(self) -> u8 {
        match self {
            FrameFormat::Raster => 0x01,
            FrameFormat::Vector => 0x02,
        }
    }

    pub fn from_wire_id(id: u8) -> Option<Self> {
        match id {
            0x01 => Some(FrameFormat::Raster),
            0x02 => Some(FrameFormat::Vector),
            _ => None,
        }
    }
}

/// One drawable element of a vector frame, in canvas pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Primitive {
    /// Layout geometry on one layer.
    Polygon {
        layer: LayerKey,
        color: Rgba,
        dither_pattern: u8,
        line_width: u16,
        points: Vec<(f32, f32)>,
    },
    /// A violation marker. `closed == false` for edges.
    Marker {
        group: String,
        color: Rgba,
        dither_pattern: u8,
        line_width: u16,
        halo: Option<u16>,
        closed: bool,
        points: Vec<(f32, f32)>,
    },
}

/// Frame payload.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameContent {
    Raster(RgbaImage),
    Vector(Vec<Primitive>),
}

/// A rendered view.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Per-session sequence number; stamped by the session, 0 until then.
    pub seq: u64,
    pub width: u32,
    pub height: u32,
    pub content: FrameContent,
}

impl Frame {
    pub fn format(&self) -> FrameFormat {
        match self.content {
            FrameContent::Raster(_) => FrameFormat::Raster,
            FrameContent::Vector(_) => FrameFormat::Vector,
        }
    }

    /// A blank frame of `canvas` size in `format`.
    pub fn blank(canvas: Canvas, format: FrameFormat) -> Self {
        let content = match format {
            FrameFormat::Raster => FrameContent::Raster(RgbaImage::new(canvas.width, canvas.height, BACKGROUND)),
            FrameFormat::Vector => FrameContent::Vector(Vec::new()),
        };
        Self {
            seq: 0,
            width: canvas.width,
            height: canvas.height,
            content,
        }
    }

    /// Draws marker groups over the frame in order, later groups on top.
    ///
    /// Markers outside the visible area, or recorded against a cell other than
    /// `cell`, are skipped. Returns how many markers were drawn.
    pub fn composite_markers(&mut self, groups: &[ItemMarkerGroup], viewport: &Viewport, cell: &str) -> usize {
        let canvas = Canvas {
            width: self.width,
            height: self.height,
        };
        let visible = viewport.visible_bounds(canvas);
        let mut drawn = 0;

        for group in groups {
            let category = group.category();
            for marker in group.markers() {
                if !marker.shows_in(cell) || !marker.shape.bbox().intersects(&visible) {
                    continue;
                }
                let (points, closed) = marker_outline(&marker.shape, viewport, canvas);
                match &mut self.content {
                    FrameContent::Raster(image) => {
                        if let Some(halo) = category.halo() {
                            let width = category.line_width().saturating_add(halo.saturating_mul(2));
                            image.stroke_polyline(&points, closed, HALO_COLOR, width);
                        }
                        if closed {
                            image.fill_polygon(&points, category.color(), category.dither_pattern());
                        }
                        image.stroke_polyline(&points, closed, category.color(), category.line_width());
                    }
                    FrameContent::Vector(primitives) => primitives.push(Primitive::Marker {
                        group: group.id().to_string(),
                        color: category.color(),
                        dither_pattern: category.dither_pattern(),
                        line_width: category.line_width(),
                        halo: category.halo(),
                        closed,
                        points: points.iter().map(|&(x, y)| (x as f32, y as f32)).collect(),
                    }),
                }
                drawn += 1;
            }
        }
        drawn
    }
}

/// Canvas-space outline of a marker and whether it is a closed shape.
fn marker_outline(shape: &MarkerShape, viewport: &Viewport, canvas: Canvas) -> (Vec<(f64, f64)>, bool) {
    let map = |x: f64, y: f64| viewport.to_canvas(canvas, x, y);
    match shape {
        MarkerShape::Box { x1, y1, x2, y2 } => (
            vec![map(*x1, *y1), map(*x2, *y1), map(*x2, *y2), map(*x1, *y2)],
            true,
        ),
        MarkerShape::Polygon { points } => (points.iter().map(|&(x, y)| map(x, y)).collect(), true),
        MarkerShape::Edge { x1, y1, x2, y2 } => (vec![map(*x1, *y1), map(*x2, *y2)], false),
    }
}

/// Everything the engine needs to draw one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub viewport: Viewport,
    pub canvas: Canvas,
    /// Cell whose hierarchy is drawn.
    pub cell: String,
    /// Visible layers in draw order, with the style to draw them in.
    pub layers: Vec<(LayerKey, LayerStyle)>,
    pub format: FrameFormat,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::marker::{CategoryConfig, Marker, MarkerCategory};

    fn group_with_box(id: &str, color: &str, x1: f64, y1: f64, x2: f64, y2: f64) -> ItemMarkerGroup {
        let category = MarkerCategory::from_config(&CategoryConfig {
            color: Some(color.into()),
            dither_pattern: Some(0),
            ..CategoryConfig::default()
        })
        .unwrap();
        let mut group = ItemMarkerGroup::new(id, category);
        group.add(Marker {
            shape: MarkerShape::Box { x1, y1, x2, y2 },
            violation_id: 0,
            message: None,
            cell: None,
        });
        group
    }

    #[test]
    fn test_format_wire_ids_round_trip() {
        for f in [FrameFormat::Raster, FrameFormat::Vector] {
            assert_eq!(FrameFormat::from_wire_id(f.wire_id()), Some(f));
        }
        assert_eq!(FrameFormat::from_wire_id(0), None);
    }

    #[test]
    fn test_later_group_paints_over_earlier() {
        // Arrange: two solid boxes covering the whole 10x10 canvas
        let canvas = Canvas::new(10, 10).unwrap();
        let viewport = Viewport::new(0.0, 0.0, 1.0).unwrap();
        let mut frame = Frame::blank(canvas, FrameFormat::Raster);
        let groups = vec![
            group_with_box("a", "red", -20.0, -20.0, 20.0, 20.0),
            group_with_box("b", "blue", -20.0, -20.0, 20.0, 20.0),
        ];

        // Act
        let drawn = frame.composite_markers(&groups, &viewport, "TOP");

        // Assert
        assert_eq!(drawn, 2);
        let FrameContent::Raster(image) = &frame.content else {
            panic!("expected raster");
        };
        assert_eq!(image.pixel(5, 5), Some(Rgba::opaque(0, 0, 0xff)));
    }

    #[test]
    fn test_offscreen_markers_are_skipped() {
        let canvas = Canvas::new(10, 10).unwrap();
        let viewport = Viewport::new(0.0, 0.0, 1.0).unwrap();
        let mut frame = Frame::blank(canvas, FrameFormat::Vector);
        let groups = vec![group_with_box("a", "red", 100.0, 100.0, 101.0, 101.0)];

        assert_eq!(frame.composite_markers(&groups, &viewport, "TOP"), 0);
        assert_eq!(frame.content, FrameContent::Vector(Vec::new()));
    }

    #[test]
    fn test_markers_of_other_cells_are_skipped() {
        // Arrange
        let canvas = Canvas::new(10, 10).unwrap();
        let viewport = Viewport::new(0.0, 0.0, 1.0).unwrap();
        let mut group = group_with_box("a", "red", 0.0, 0.0, 2.0, 2.0);
        group.add(Marker {
            shape: MarkerShape::Box { x1: 0.0, y1: 0.0, x2: 1.0, y2: 1.0 },
            violation_id: 1,
            message: None,
            cell: Some("SUB".into()),
        });
        let groups = vec![group];

        // Act
        let on_top = Frame::blank(canvas, FrameFormat::Vector).composite_markers(&groups, &viewport, "TOP");
        let on_sub = Frame::blank(canvas, FrameFormat::Vector).composite_markers(&groups, &viewport, "SUB");

        // Assert: the cell-less marker shows everywhere, the SUB one only in SUB
        assert_eq!(on_top, 1);
        assert_eq!(on_sub, 2);
    }

    #[test]
    fn test_vector_markers_carry_group_and_style() {
        let canvas = Canvas::new(10, 10).unwrap();
        let viewport = Viewport::new(0.0, 0.0, 1.0).unwrap();
        let mut frame = Frame::blank(canvas, FrameFormat::Vector);
        let groups = vec![group_with_box("M1.S.1", "red", 0.0, 0.0, 2.0, 2.0)];

        frame.composite_markers(&groups, &viewport, "TOP");

        let FrameContent::Vector(prims) = &frame.content else {
            panic!("expected vector");
        };
        match &prims[0] {
            Primitive::Marker { group, closed, points, .. } => {
                assert_eq!(group, "M1.S.1");
                assert!(*closed);
                // Layout (0,0) sits at the canvas centre.
                assert_eq!(points[0], (5.0, 5.0));
            }
            other => panic!("unexpected primitive {other:?}"),
        }
    }
}
