//! Draws a view of a [`LayoutFile`].
//!
//! The cell hierarchy is flattened on every render and each polygon is culled
//! against the visible area before it is transformed to canvas pixels.
//! Layers are drawn in the order the request lists them.

use std::collections::HashMap;

use gdsview_core::{
    BBox, EngineError, Frame, FrameContent, LayerKey, LayoutFile, Primitive, RenderRequest,
};

/// Polygons smaller than this many pixels on both axes are drawn as a single
/// dot in raster frames and dropped from vector frames.
const MIN_FEATURE_PX: f64 = 0.5;

/// Renders `request` against `file`.
///
/// # Errors
///
/// [`EngineError::UnknownCell`] if the requested cell is not in the library.
pub fn render_view(file: &LayoutFile, request: &RenderRequest) -> Result<Frame, EngineError> {
    let canvas = request.canvas;
    let viewport = request.viewport;
    let visible = viewport.visible_bounds(canvas);

    let order: HashMap<LayerKey, usize> = request
        .layers
        .iter()
        .enumerate()
        .map(|(i, (key, _))| (*key, i))
        .collect();
    let mut buckets: Vec<Vec<Vec<(f64, f64)>>> = vec![Vec::new(); request.layers.len()];
    let mut culled = 0usize;

    let found = file.library().flatten(&request.cell, |layer, points| {
        let Some(&slot) = order.get(&layer) else {
            return;
        };
        if !BBox::of_points(points.iter().copied()).intersects(&visible) {
            culled += 1;
            return;
        }
        buckets[slot].push(
            points
                .iter()
                .map(|&(x, y)| viewport.to_canvas(canvas, x, y))
                .collect(),
        );
    });
    if !found {
        return Err(EngineError::UnknownCell(request.cell.clone()));
    }

    let mut frame = Frame::blank(canvas, request.format);
    let mut drawn = 0usize;
    match &mut frame.content {
        FrameContent::Raster(image) => {
            for ((_, style), polygons) in request.layers.iter().zip(&buckets) {
                let outline = style.color.with_alpha(0xff);
                for poly in polygons {
                    let extent = BBox::of_points(poly.iter().copied());
                    if extent.width() < MIN_FEATURE_PX && extent.height() < MIN_FEATURE_PX {
                        let (cx, cy) = extent.center();
                        image.blend(cx.floor() as i64, cy.floor() as i64, outline);
                    } else {
                        image.fill_polygon(poly, style.color, style.dither_pattern);
                        image.stroke_polyline(poly, true, outline, style.line_width);
                    }
                    drawn += 1;
                }
            }
        }
        FrameContent::Vector(primitives) => {
            for ((key, style), polygons) in request.layers.iter().zip(&buckets) {
                for poly in polygons {
                    let extent = BBox::of_points(poly.iter().copied());
                    if extent.width() < MIN_FEATURE_PX && extent.height() < MIN_FEATURE_PX {
                        continue;
                    }
                    primitives.push(Primitive::Polygon {
                        layer: *key,
                        color: style.color,
                        dither_pattern: style.dither_pattern,
                        line_width: style.line_width,
                        points: poly.iter().map(|&(x, y)| (x as f32, y as f32)).collect(),
                    });
                    drawn += 1;
                }
            }
        }
    }

    tracing::trace!(
        "rendered cell '{}' as {:?}: {drawn} polygons drawn, {culled} culled",
        request.cell,
        request.format
    );
    Ok(frame)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
