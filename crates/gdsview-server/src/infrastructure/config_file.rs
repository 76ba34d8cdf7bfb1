//! Optional TOML configuration file (`--config`).
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0"
//! port = 8765
//!
//! [files]
//! root = "/data/layouts"
//! default_file = "chip.gds"
//!
//! [view]
//! editable = false
//! add_missing_layers = true
//! meta_splitter = ":"
//! max_rdb_limit = 100
//! render_timeout_ms = 5000
//! canvas_width = 800
//! canvas_height = 600
//! ```
//!
//! # Serde default values
//!
//! Every field has a `#[serde(default = "...")]` helper returning the
//! built-in default, so an empty file, or one that sets only a few keys, is
//! valid. CLI flags and `GDSVIEW_*` variables override whatever the file
//! says; see `main.rs`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Error type for configuration file loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub files: FilesSection,
    #[serde(default)]
    pub view: ViewSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// IP address to bind to.
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilesSection {
    /// Served directory. Relative paths are taken from the working directory.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Pinned file served to clients that do not ask for one.
    #[serde(default)]
    pub default_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ViewSection {
    #[serde(default)]
    pub editable: bool,
    #[serde(default = "default_true")]
    pub add_missing_layers: bool,
    #[serde(default = "default_meta_splitter")]
    pub meta_splitter: String,
    #[serde(default = "default_max_rdb_limit")]
    pub max_rdb_limit: usize,
    #[serde(default = "default_render_timeout_ms")]
    pub render_timeout_ms: u64,
    #[serde(default = "default_canvas_width")]
    pub canvas_width: u32,
    #[serde(default = "default_canvas_height")]
    pub canvas_height: u32,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8765
}
fn default_true() -> bool {
    true
}
fn default_meta_splitter() -> String {
    ":".to_string()
}
fn default_max_rdb_limit() -> usize {
    100
}
fn default_render_timeout_ms() -> u64 {
    5000
}
fn default_canvas_width() -> u32 {
    800
}
fn default_canvas_height() -> u32 {
    600
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl Default for ViewSection {
    fn default() -> Self {
        Self {
            editable: false,
            add_missing_layers: default_true(),
            meta_splitter: default_meta_splitter(),
            max_rdb_limit: default_max_rdb_limit(),
            render_timeout_ms: default_render_timeout_ms(),
            canvas_width: default_canvas_width(),
            canvas_height: default_canvas_height(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Reads and parses the config file at `path`.
///
/// Unlike the layer-properties sidecar, a missing file is an error here: the
/// user named it explicitly.
///
/// # Errors
///
/// [`ConfigError::Io`] or [`ConfigError::Parse`].
pub fn load_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Parses config TOML.
///
/// # Errors
///
/// [`ConfigError::Parse`] for invalid TOML or unknown keys.
pub fn parse_config(content: &str) -> Result<ConfigFile, ConfigError> {
    Ok(toml::from_str(content)?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
