//! gdsview-server library crate.
//!
//! Streams interactive views of chip-layout files to browsers over a
//! WebSocket and overlays design-rule-check (DRC) violation markers on the
//! rendered geometry.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Browser (JSON + binary frames over WebSocket)
//!         ↕
//! [gdsview-server]
//!   ├── domain/           Pure types: ServerConfig, wire messages, ViewError
//!   ├── application/
//!   │     ├── paths            Root-confined path resolution
//!   │     ├── rdb              Violation database → marker groups
//!   │     ├── render_session   One open file's view state
//!   │     ├── registry         Shared sessions keyed by resolved path
//!   │     └── endpoint         Per-connection command handling
//!   └── infrastructure/
//!         ├── ws_server        WebSocket accept loop (tokio-tungstenite)
//!         └── config_file      Optional TOML configuration
//!         ↕
//! GeometryEngine (gdsview-core trait, gdsview-engine implementation)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `gdsview-core`; it talks to the
//!   client through the [`application::endpoint::ClientSink`] trait and to
//!   the geometry engine through [`gdsview_core::GeometryEngine`].
//! - `infrastructure` owns sockets and files.
//!
//! # For beginners: why this structure?
//!
//! The session and endpoint logic can be tested with an in-memory sink and a
//! stub engine, without a browser or a real layout file. Only the thin
//! `ws_server` module knows about WebSocket framing.

/// Domain layer: configuration, wire messages and errors (no I/O).
pub mod domain;

/// Application layer: sessions, registry, RDB adapter and command handling.
pub mod application;

/// Infrastructure layer: WebSocket server and configuration file.
pub mod infrastructure;
