//! # gdsview-engine
//!
//! The geometry engine bundled with gdsview. It reads GDSII streams into the
//! layout model from `gdsview-core`, picks up an optional layer-properties
//! sidecar, and renders views as raster or vector frames.
//!
//! OASIS files are recognised by extension and rejected with
//! [`EngineError::Format`].

pub mod gds;
pub mod layer_props;
pub mod renderer;

use std::path::Path;

use gdsview_core::{EngineError, EngineOptions, Frame, GeometryEngine, LayoutFile, RenderRequest};

pub use gds::{read_library, GdsError, GdsWriter};
pub use layer_props::{load_layer_properties, parse_layer_properties, sidecar_path, LayerPropsError};
pub use renderer::render_view;

/// GDSII-backed [`GeometryEngine`].
#[derive(Debug, Default, Clone, Copy)]
pub struct GdsEngine;

impl GdsEngine {
    pub fn new() -> Self {
        Self
    }
}

fn is_oasis(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("oas") || e.eq_ignore_ascii_case("oasis"))
}

impl GeometryEngine for GdsEngine {
    fn open_file(&self, path: &Path, options: &EngineOptions) -> Result<LayoutFile, EngineError> {
        if is_oasis(path) {
            return Err(EngineError::Format(format!(
                "{}: OASIS input is not supported by the bundled engine",
                path.display()
            )));
        }
        let bytes = std::fs::read(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                EngineError::NotFound(path.to_path_buf())
            } else {
                EngineError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let library = read_library(&bytes, &options.meta_splitter)
            .map_err(|e| EngineError::Format(format!("{}: {e}", path.display())))?;
        let declared = load_layer_properties(path).map_err(|e| EngineError::Format(e.to_string()))?;

        let file = LayoutFile::new(path, library, declared);
        tracing::info!(
            "opened {} ({} cells, top cell {:?}, {} declared layers)",
            path.display(),
            file.library().cells().len(),
            file.top_cell(),
            file.declared_layers().len()
        );
        Ok(file)
    }

    fn render(&self, file: &LayoutFile, request: &RenderRequest) -> Result<Frame, EngineError> {
        render_view(file, request)
    }
}
