//! Layer identity and display style.
//!
//! A layer is selected by its `(layer number, datatype)` pair. The display
//! name and style come either from a layer-properties declaration or, for
//! layers that only show up in the geometry, from [`LayerStyle::synthesized`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::color::{palette_color, Rgba};

/// Dither pattern index for solid fills.
pub const DITHER_SOLID: u8 = 0;
/// Dither pattern index for outline-only drawing.
pub const DITHER_HOLLOW: u8 = 1;
/// Widest outline the rasteriser accepts, in pixels.
pub const MAX_LINE_WIDTH: u16 = 64;

/// A `(layer, datatype)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerKey {
    pub layer: u16,
    pub datatype: u16,
}

impl LayerKey {
    pub const fn new(layer: u16, datatype: u16) -> Self {
        Self { layer, datatype }
    }
}

impl fmt::Display for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.layer, self.datatype)
    }
}

/// How the geometry on one layer is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerStyle {
    /// Fill and outline color. Alpha controls fill translucency.
    pub color: Rgba,
    /// Fill stipple; see [`crate::render::raster::dither_hit`].
    pub dither_pattern: u8,
    /// Outline width in pixels, `1..=MAX_LINE_WIDTH`.
    pub line_width: u16,
}

impl LayerStyle {
    /// Default style for a layer nobody declared.
    ///
    /// The color is picked from the palette by the layer key so the same layer
    /// always comes back in the same color.
    pub fn synthesized(key: LayerKey) -> Self {
        let mut seed = [0u8; 4];
        seed[..2].copy_from_slice(&key.layer.to_be_bytes());
        seed[2..].copy_from_slice(&key.datatype.to_be_bytes());
        Self {
            color: palette_color(&seed).with_alpha(0x80),
            dither_pattern: 2,
            line_width: 1,
        }
    }
}

/// A declared (or synthesized) layer as listed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerInfo {
    pub key: LayerKey,
    /// Display name; falls back to `"layer/datatype"`.
    pub name: String,
    pub style: LayerStyle,
    /// Initial visibility.
    pub visible: bool,
}

impl LayerInfo {
    /// A synthesized layer entry with default name and style.
    pub fn synthesized(key: LayerKey) -> Self {
        Self {
            key,
            name: key.to_string(),
            style: LayerStyle::synthesized(key),
            visible: true,
        }
    }
}
