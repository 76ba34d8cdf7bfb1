//! Application layer for gdsview-server.
//!
//! Knows *what* to do with a client's commands; delegates rendering to the
//! geometry engine and transport to the infrastructure layer.
//!
//! # Responsibilities
//!
//! - Confining client paths to the served root
//! - Loading violation databases and grouping them into markers
//! - Holding each open file's view state and producing frames
//! - Sharing sessions between clients and releasing them
//! - Turning inbound commands into session calls and outbound messages
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or listening for connections (that is infrastructure)
//! - WebSocket framing (handled by tokio-tungstenite)
//! - Reading CLI flags or config files (that is done in `main.rs`)

pub mod endpoint;
pub mod paths;
pub mod rdb;
pub mod registry;
pub mod render_session;

pub use endpoint::{ClientSink, Flow, LayoutViewEndpoint};
pub use paths::resolve_under_root;
pub use rdb::{RdbAdapter, RdbResultSet, RuleEntry, Severity, ViolationItem};
pub use registry::{SessionGuard, SessionLease, SessionRegistry, SharedSession};
pub use render_session::{LayerStyleUpdate, RenderSession, RenderedFrame, SessionSnapshot, SessionState};
