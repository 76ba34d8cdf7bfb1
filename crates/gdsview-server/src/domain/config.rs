//! Server configuration types.
//!
//! [`ServerConfig`] is the single source of truth for all runtime settings.
//! `main.rs` layers built-in defaults, an optional TOML file and CLI flags /
//! `GDSVIEW_*` environment variables into one of these, validates it, and
//! hands it to the registry and the accept loop.
//!
//! # Design rationale
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! variable reads inside the domain) makes the server easy to embed in tests.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use gdsview_core::Canvas;

/// All runtime configuration for the layout-view server.
///
/// # Example
///
/// ```rust
/// use gdsview_server::domain::ServerConfig;
///
/// let cfg = ServerConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 8765);
/// assert_eq!(cfg.max_rdb_limit, 100);
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: SocketAddr,

    /// Directory every client-requested path must resolve under.
    ///
    /// `main.rs` canonicalizes it before the server starts, so symlink escapes
    /// can be detected by comparing canonical paths.
    pub root: PathBuf,

    /// Whether clients may change layer styles.
    pub editable: bool,

    /// Whether geometry on undeclared layers gets a synthesized layer entry
    /// instead of being hidden and rejected.
    pub add_missing_layers: bool,

    /// Key/value separator in element properties that carry cell meta-info.
    /// Passed to the geometry engine untouched.
    pub meta_splitter: String,

    /// Most violation markers one `load-rdb` may attach. Always > 0.
    pub max_rdb_limit: usize,

    /// Upper bound on a single engine render.
    pub render_timeout: Duration,

    /// Canvas size a new session starts with, until a client resizes it.
    pub canvas: Canvas,

    /// File served to clients that do not ask for one. Its session is
    /// pinned: it stays open with zero clients attached.
    pub default_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    /// | Field              | Default            |
    /// |--------------------|--------------------|
    /// | bind_addr          | `127.0.0.1:8765`   |
    /// | root               | `.`                |
    /// | editable           | `false`            |
    /// | add_missing_layers | `true`             |
    /// | meta_splitter      | `":"`              |
    /// | max_rdb_limit      | `100`              |
    /// | render_timeout     | 5 seconds          |
    /// | canvas             | 800 x 600          |
    /// | default_file       | none               |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8765)),
            root: PathBuf::from("."),
            editable: false,
            add_missing_layers: true,
            meta_splitter: ":".to_string(),
            max_rdb_limit: 100,
            render_timeout: Duration::from_secs(5),
            canvas: Canvas::default(),
            default_file: None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
