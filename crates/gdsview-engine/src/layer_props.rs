//! Layer-properties sidecar files.
//!
//! A layout `chip.gds` may be accompanied by `chip.gds.layers.toml` declaring
//! display names and styles:
//!
//! ```toml
//! [[layer]]
//! layer = 1
//! datatype = 0
//! name = "M1"
//! color = "#4080ff80"
//! dither_pattern = 2
//! line_width = 1
//! visible = true
//! ```
//!
//! Every field other than `layer` has a default, so a bare list of layer
//! numbers is a valid declaration. Declaration order is draw order.

use std::path::{Path, PathBuf};

use gdsview_core::{ColorError, LayerInfo, LayerKey, LayerStyle, Rgba, MAX_LINE_WIDTH};
use serde::Deserialize;
use thiserror::Error;

/// Suffix appended to the layout file name to find its sidecar.
pub const SIDECAR_SUFFIX: &str = ".layers.toml";

/// Error type for sidecar loading.
#[derive(Debug, Error)]
pub enum LayerPropsError {
    #[error("I/O error reading layer properties at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse layer properties TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("layer {layer}: {source}")]
    Color {
        layer: LayerKey,
        #[source]
        source: ColorError,
    },

    #[error("layer {0}: line width must be in 1..=64")]
    LineWidth(LayerKey),

    #[error("layer {0} declared twice")]
    Duplicate(LayerKey),
}

// ── Sidecar schema types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LayerPropsFile {
    #[serde(default, rename = "layer")]
    layers: Vec<LayerEntry>,
}

#[derive(Debug, Deserialize)]
struct LayerEntry {
    layer: u16,
    #[serde(default)]
    datatype: u16,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    dither_pattern: Option<u8>,
    #[serde(default)]
    line_width: Option<u16>,
    #[serde(default = "default_true")]
    visible: bool,
}

fn default_true() -> bool {
    true
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Path of the sidecar belonging to `layout`.
pub fn sidecar_path(layout: &Path) -> PathBuf {
    let mut name = layout.as_os_str().to_os_string();
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

/// Loads the sidecar next to `layout`, or an empty declaration if there is
/// none.
///
/// # Errors
///
/// [`LayerPropsError::Io`] for file-system errors other than "not found", and
/// the parse / validation variants for a malformed file.
pub fn load_layer_properties(layout: &Path) -> Result<Vec<LayerInfo>, LayerPropsError> {
    let path = sidecar_path(layout);
    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let layers = parse_layer_properties(&content)?;
            tracing::debug!("loaded {} layer declarations from {}", layers.len(), path.display());
            Ok(layers)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(source) => Err(LayerPropsError::Io { path, source }),
    }
}

/// Parses sidecar TOML into layer declarations, in file order.
///
/// Unset styles fall back to [`LayerStyle::synthesized`] for that layer.
///
/// # Errors
///
/// See [`LayerPropsError`].
pub fn parse_layer_properties(content: &str) -> Result<Vec<LayerInfo>, LayerPropsError> {
    let file: LayerPropsFile = toml::from_str(content)?;
    let mut out: Vec<LayerInfo> = Vec::with_capacity(file.layers.len());
    for entry in file.layers {
        let key = LayerKey::new(entry.layer, entry.datatype);
        if out.iter().any(|l| l.key == key) {
            return Err(LayerPropsError::Duplicate(key));
        }
        let fallback = LayerStyle::synthesized(key);
        let color = match entry.color.as_deref() {
            Some(c) => Rgba::parse(c).map_err(|source| LayerPropsError::Color { layer: key, source })?,
            None => fallback.color,
        };
        let line_width = entry.line_width.unwrap_or(fallback.line_width);
        if !(1..=MAX_LINE_WIDTH).contains(&line_width) {
            return Err(LayerPropsError::LineWidth(key));
        }
        out.push(LayerInfo {
            key,
            name: entry.name.unwrap_or_else(|| key.to_string()),
            style: LayerStyle {
                color,
                dither_pattern: entry.dither_pattern.unwrap_or(fallback.dither_pattern),
                line_width,
            },
            visible: entry.visible,
        });
    }
    Ok(out)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
