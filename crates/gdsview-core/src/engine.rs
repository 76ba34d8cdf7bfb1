//! The seam between the view server and whatever reads and draws layouts.
//!
//! The server never parses layout files itself. It hands paths and render
//! requests to a [`GeometryEngine`] and works with the [`LayoutFile`] and
//! [`Frame`] values that come back. Calls are blocking; the server moves them
//! onto a blocking thread.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::domain::layout::LayoutFile;
use crate::render::frame::{Frame, RenderRequest};

/// Failures reported by a geometry engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("i/o error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but is not a layout this engine understands.
    #[error("invalid layout data: {0}")]
    Format(String),

    #[error("unknown cell: '{0}'")]
    UnknownCell(String),

    #[error("render failed: {0}")]
    Render(String),
}

/// Options forwarded to [`GeometryEngine::open_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Separator between key and value in element properties that carry
    /// cell meta-info. Passed through untouched.
    pub meta_splitter: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            meta_splitter: ":".to_string(),
        }
    }
}

/// Reads layout files and renders views of them.
///
/// Implementations must be shareable across threads; one `LayoutFile` is
/// only ever rendered by one thread at a time.
pub trait GeometryEngine: Send + Sync {
    /// Opens and fully loads a layout file.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`], [`EngineError::Io`] or
    /// [`EngineError::Format`].
    fn open_file(&self, path: &Path, options: &EngineOptions) -> Result<LayoutFile, EngineError>;

    /// Draws the requested view. The returned frame has `seq == 0` and no
    /// markers; both are added by the caller.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownCell`] or [`EngineError::Render`].
    fn render(&self, file: &LayoutFile, request: &RenderRequest) -> Result<Frame, EngineError>;
}
