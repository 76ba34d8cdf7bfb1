//! Infrastructure layer for gdsview-server.
//!
//! Handles all I/O that is not the geometry engine's: accepting WebSocket
//! connections and reading the optional configuration file.
//!
//! # Responsibilities
//!
//! - Binding a TCP listener for browser WebSocket connections
//! - Performing the WebSocket HTTP upgrade handshake (path and query checks)
//! - Spawning per-connection Tokio tasks
//! - Handling the graceful shutdown signal
//! - Parsing the TOML configuration file
//!
//! # What does NOT belong here?
//!
//! - Command handling and session state (that is the application layer)
//! - Message type definitions (that is the domain layer)

pub mod config_file;
pub mod ws_server;

pub use config_file::{load_config_file, ConfigError, ConfigFile};
pub use ws_server::{run_server, run_server_on, WsSink, WS_PATH};
