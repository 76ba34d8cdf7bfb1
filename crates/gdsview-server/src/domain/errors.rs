//! The error every client command can fail with.
//!
//! Each variant maps to a stable kebab-case [`ViewError::kind`] that is sent
//! to the browser in `error` messages, so clients can branch on it without
//! parsing the human-readable text. Only [`ViewError::Connection`] ends a
//! connection; everything else is reported and the session carries on.

use std::path::PathBuf;
use std::time::Duration;

use gdsview_core::{CategoryError, ColorError, EngineError, FrameCodecError, LayerKey, ViewportError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewError {
    /// The requested path resolves outside the served root, lexically or
    /// through a symlink.
    #[error("path '{}' is outside the served directory", .0.display())]
    PathEscape(PathBuf),

    #[error("layout is read-only; start the server with --editable to change layer styles")]
    ReadOnly,

    #[error("unknown layer {0}")]
    UnknownLayer(LayerKey),

    #[error("unknown cell '{0}'")]
    UnknownCell(String),

    #[error(transparent)]
    InvalidViewport(#[from] ViewportError),

    #[error("invalid layer style: {0}")]
    InvalidStyle(String),

    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The file exists but could not be read as a layout or violation
    /// database.
    #[error("cannot read file: {0}")]
    Format(String),

    #[error("render did not finish within {} ms", .0.as_millis())]
    RenderTimeout(Duration),

    #[error("geometry engine failure: {0}")]
    Engine(String),

    #[error("no layout is open")]
    NoSession,

    #[error("no violation database is loaded")]
    NoRdb,

    /// A category, cell or item id the loaded database does not have.
    #[error("unknown violation database entry: {0}")]
    UnknownRdbEntry(String),

    #[error("session is closed")]
    SessionClosed,

    /// The client transport failed. Terminates the connection.
    #[error("connection error: {0}")]
    Connection(String),
}

impl ViewError {
    /// Stable wire name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ViewError::PathEscape(_) => "path-escape",
            ViewError::ReadOnly => "read-only",
            ViewError::UnknownLayer(_) => "unknown-layer",
            ViewError::UnknownCell(_) => "unknown-cell",
            ViewError::InvalidViewport(_) => "invalid-viewport",
            ViewError::InvalidStyle(_) => "invalid-style",
            ViewError::NotFound(_) => "not-found",
            ViewError::Format(_) => "format",
            ViewError::RenderTimeout(_) => "render-timeout",
            ViewError::Engine(_) => "engine",
            ViewError::NoSession => "no-session",
            ViewError::NoRdb => "no-rdb",
            ViewError::UnknownRdbEntry(_) => "unknown-rdb-entry",
            ViewError::SessionClosed => "session-closed",
            ViewError::Connection(_) => "connection",
        }
    }

    /// `true` if the connection cannot continue after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ViewError::Connection(_))
    }
}

impl From<EngineError> for ViewError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NotFound(path) => ViewError::NotFound(path),
            EngineError::UnknownCell(cell) => ViewError::UnknownCell(cell),
            EngineError::Render(message) => ViewError::Engine(message),
            other @ (EngineError::Io { .. } | EngineError::Format(_)) => ViewError::Format(other.to_string()),
        }
    }
}

impl From<CategoryError> for ViewError {
    fn from(e: CategoryError) -> Self {
        ViewError::Format(e.to_string())
    }
}

impl From<ColorError> for ViewError {
    fn from(e: ColorError) -> Self {
        ViewError::InvalidStyle(e.to_string())
    }
}

impl From<FrameCodecError> for ViewError {
    fn from(e: FrameCodecError) -> Self {
        ViewError::Engine(format!("frame encoding failed: {e}"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_kebab_case() {
        let errors = [
            ViewError::PathEscape(PathBuf::from("/etc/passwd")),
            ViewError::ReadOnly,
            ViewError::UnknownLayer(LayerKey::new(1, 0)),
            ViewError::RenderTimeout(Duration::from_millis(10)),
            ViewError::NoSession,
            ViewError::NoRdb,
            ViewError::UnknownRdbEntry("cell 9".into()),
        ];
        for e in errors {
            let kind = e.kind();
            assert!(kind.chars().all(|c| c.is_ascii_lowercase() || c == '-'), "{kind}");
        }
    }

    #[test]
    fn test_only_connection_errors_are_fatal() {
        assert!(ViewError::Connection("reset".into()).is_fatal());
        assert!(!ViewError::ReadOnly.is_fatal());
        assert!(!ViewError::RenderTimeout(Duration::from_secs(1)).is_fatal());
    }

    #[test]
    fn test_engine_not_found_keeps_its_kind() {
        // Arrange
        let e = EngineError::NotFound(PathBuf::from("/x.gds"));
        // Act
        let view: ViewError = e.into();
        // Assert
        assert_eq!(view.kind(), "not-found");
    }

    #[test]
    fn test_engine_format_maps_to_format() {
        let view: ViewError = EngineError::Format("bad header".into()).into();
        assert_eq!(view.kind(), "format");
        assert!(view.to_string().contains("bad header"));
    }

    #[test]
    fn test_viewport_error_maps_to_invalid_viewport() {
        let view: ViewError = ViewportError::InvalidScale(0.0).into();
        assert_eq!(view.kind(), "invalid-viewport");
    }
}
