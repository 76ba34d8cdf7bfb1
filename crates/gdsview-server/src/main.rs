//! gdsview layout-view server: entry point.
//!
//! Serves interactive views of GDSII layout files to browsers over a
//! WebSocket at `/ws?file=<path>` and overlays DRC violation markers loaded
//! from rule-violation databases.
//!
//! # Usage
//!
//! ```text
//! gdsview-server [OPTIONS]
//!
//! Options:
//!   --port <PORT>                 WebSocket listener port [default: 8765]
//!   --bind <IP>                   Address to bind [default: 127.0.0.1]
//!   --root <DIR>                  Served directory [default: . or the --file directory]
//!   --file <FILE>                 Pinned default file
//!   --editable <BOOL>             Allow layer style changes [default: false]
//!   --add-missing-layers <BOOL>   Synthesize undeclared layers [default: true]
//!   --meta-splitter <SEP>         Meta-info key/value separator [default: ":"]
//!   --max-rdb-limit <N>           Markers per RDB load [default: 100]
//!   --render-timeout-ms <MS>      Per-render deadline [default: 5000]
//!   --config <FILE>               TOML configuration file
//! ```
//!
//! # Configuration precedence
//!
//! Lowest to highest: built-in defaults, the `--config` TOML file, then CLI
//! flags and their environment variables.
//!
//! | Variable                      | Flag                   |
//! |-------------------------------|------------------------|
//! | `GDSVIEW_PORT`                | `--port`               |
//! | `GDSVIEW_BIND`                | `--bind`               |
//! | `GDSVIEW_ROOT`                | `--root`               |
//! | `GDSVIEW_FILE`                | `--file`               |
//! | `GDSVIEW_EDITABLE`            | `--editable`           |
//! | `GDSVIEW_ADD_MISSING_LAYERS`  | `--add-missing-layers` |
//! | `GDSVIEW_META_SPLITTER`       | `--meta-splitter`      |
//! | `GDSVIEW_MAX_RDB_LIMIT`       | `--max-rdb-limit`      |
//! | `GDSVIEW_RENDER_TIMEOUT_MS`   | `--render-timeout-ms`  |
//! | `GDSVIEW_CONFIG`              | `--config`             |

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gdsview_core::{Canvas, GeometryEngine};
use gdsview_engine::GdsEngine;
use gdsview_server::application::SessionRegistry;
use gdsview_server::domain::ServerConfig;
use gdsview_server::infrastructure::{load_config_file, run_server, ConfigFile};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// gdsview layout-view server.
///
/// Every option is optional so that values from `--config` apply unless a
/// flag or environment variable overrides them.
#[derive(Debug, Default, Parser)]
#[command(
    name = "gdsview-server",
    about = "WebSocket layout-view server with DRC marker overlays",
    version
)]
struct Cli {
    /// TCP port for the WebSocket server.
    #[arg(long, env = "GDSVIEW_PORT")]
    port: Option<u16>,

    /// IP address to bind to. `0.0.0.0` accepts LAN connections.
    #[arg(long, env = "GDSVIEW_BIND")]
    bind: Option<String>,

    /// Directory client paths are confined to.
    #[arg(long, env = "GDSVIEW_ROOT")]
    root: Option<PathBuf>,

    /// File served to clients that do not name one. Its session stays open
    /// for the life of the server. Without `--root`, its directory becomes
    /// the root.
    #[arg(long, env = "GDSVIEW_FILE")]
    file: Option<PathBuf>,

    /// Allow clients to change layer styles.
    #[arg(long, env = "GDSVIEW_EDITABLE")]
    editable: Option<bool>,

    /// Give geometry on undeclared layers a synthesized layer entry.
    #[arg(long, env = "GDSVIEW_ADD_MISSING_LAYERS")]
    add_missing_layers: Option<bool>,

    /// Separator between key and value in cell meta-info properties.
    #[arg(long, env = "GDSVIEW_META_SPLITTER")]
    meta_splitter: Option<String>,

    /// Most violation markers a single RDB load attaches.
    #[arg(long, env = "GDSVIEW_MAX_RDB_LIMIT")]
    max_rdb_limit: Option<usize>,

    /// Deadline for one render, in milliseconds.
    #[arg(long, env = "GDSVIEW_RENDER_TIMEOUT_MS")]
    render_timeout_ms: Option<u64>,

    /// TOML configuration file.
    #[arg(long, env = "GDSVIEW_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Loads `--config` if given and merges everything into a validated
    /// [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read, or if any value is
    /// invalid (see [`Cli::merge`]).
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let file = match &self.config {
            Some(path) => {
                load_config_file(path).with_context(|| format!("failed to load config file {}", path.display()))?
            }
            None => ConfigFile::default(),
        };
        self.merge(file)
    }

    /// Applies CLI values over `file`.
    ///
    /// # Errors
    ///
    /// Returns an error for an unparsable bind address, a zero RDB limit or
    /// render timeout, an invalid canvas size, a root that does not exist,
    /// or a default file that is missing or outside the root.
    fn merge(self, file: ConfigFile) -> anyhow::Result<ServerConfig> {
        let bind = self.bind.unwrap_or(file.server.bind);
        let ip: IpAddr = bind
            .parse()
            .with_context(|| format!("invalid bind address: '{bind}'"))?;
        let bind_addr = SocketAddr::new(ip, self.port.unwrap_or(file.server.port));

        let max_rdb_limit = self.max_rdb_limit.unwrap_or(file.view.max_rdb_limit);
        if max_rdb_limit == 0 {
            bail!("max RDB limit must be greater than 0");
        }
        let render_timeout_ms = self.render_timeout_ms.unwrap_or(file.view.render_timeout_ms);
        if render_timeout_ms == 0 {
            bail!("render timeout must be greater than 0 ms");
        }
        let canvas = Canvas::new(file.view.canvas_width, file.view.canvas_height).context("invalid canvas size")?;

        let default_file = match self.file.or(file.files.default_file) {
            Some(path) => Some(canonical_file(&path)?),
            None => None,
        };
        let root = match (self.root.or(file.files.root), &default_file) {
            (Some(root), _) => root,
            (None, Some(pinned)) => pinned.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("/")),
            (None, None) => PathBuf::from("."),
        };
        let root = root
            .canonicalize()
            .with_context(|| format!("root directory {} does not exist", root.display()))?;
        if let Some(pinned) = &default_file {
            if !pinned.starts_with(&root) {
                bail!("default file {} is outside the root {}", pinned.display(), root.display());
            }
        }

        Ok(ServerConfig {
            bind_addr,
            root,
            editable: self.editable.unwrap_or(file.view.editable),
            add_missing_layers: self.add_missing_layers.unwrap_or(file.view.add_missing_layers),
            meta_splitter: self.meta_splitter.unwrap_or(file.view.meta_splitter),
            max_rdb_limit,
            render_timeout: Duration::from_millis(render_timeout_ms),
            canvas,
            default_file,
        })
    }
}

fn canonical_file(path: &Path) -> anyhow::Result<PathBuf> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("file not found: {}", path.display()))?;
    if !canonical.is_file() {
        bail!("not a file: {}", canonical.display());
    }
    Ok(canonical)
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// # What happens at startup
///
/// 1. `tracing_subscriber` is initialised; `RUST_LOG` picks the level.
/// 2. CLI arguments and the optional config file become a [`ServerConfig`].
/// 3. The session registry is created around the bundled GDSII engine and
///    the default file, if any, is opened and pinned.
/// 4. A Ctrl+C handler clears the shared `running` flag.
/// 5. [`run_server`] accepts connections until the flag is cleared.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Cli::parse().into_server_config()?;
    info!(
        "gdsview server starting: ws={}, root={}, editable={}",
        config.bind_addr,
        config.root.display(),
        config.editable
    );

    let engine: Arc<dyn GeometryEngine> = Arc::new(GdsEngine::new());
    let default_file = config.default_file.clone();
    let registry = SessionRegistry::new(engine, Arc::new(config));
    if let Some(path) = default_file {
        registry
            .pin(&path)
            .await
            .with_context(|| format!("failed to open default file {}", path.display()))?;
    }

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(registry, running).await?;

    info!("gdsview server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
