//! Domain layer for gdsview-server.
//!
//! Pure types with no dependencies on I/O, networking or the async runtime.
//!
//! # What belongs in the domain layer?
//!
//! - Server configuration
//! - Message types (the JSON "language" between browser and server)
//! - The error type every command can fail with
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or `WebSocket` types
//! - File I/O or environment variable reading
//! - Anything that could block or fail due to external state

pub mod config;
pub mod errors;
pub mod messages;

pub use config::ServerConfig;
pub use errors::ViewError;
pub use messages::{ClientCommand, CommandParseError, ServerMessage};
