//! ws-push - Thread-safe WebSocket connections for push servers.
//!
//! A WebSocket is a blocking, non-reentrant duplex stream: one task may
//! receive while another sends, but nothing more. This crate wraps such a
//! stream into a [`Connection`] that exposes two bounded queues to any number
//! of concurrent callers, with a single idempotent shutdown path.
//!
//! # Architecture
//!
//! - **[`Connection`]**: read pump + write pump + shutdown signal over one
//!   [`DuplexStream`]
//! - **[`WsStream`]**: [`DuplexStream`] over a `tokio-tungstenite` WebSocket
//! - **[`Server`]**: HTTP upgrade listener running an echo [`session`] with a
//!   heartbeat on each connection
//!
//! Key design principles:
//!
//! - Bounded queues block producers instead of dropping messages
//! - Any stream error is fatal and closes the whole connection
//! - Callers only ever see [`Error::ConnectionClosed`]
//!
//! # Quick Start
//!
//! ```no_run
//! use ws_push::{Connection, Result, WsStream};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let (ws_stream, _) = tokio_tungstenite::connect_async("ws://127.0.0.1:7777/ws").await?;
//!     let connection = Connection::open(WsStream::new(ws_stream))?;
//!
//!     connection.write_message("hello").await?;
//!     let reply = connection.read_message().await?;
//!     println!("{}", String::from_utf8_lossy(&reply));
//!
//!     connection.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`options`] | Connection, session, and server options |
//! | [`session`] | Echo loop and heartbeat |
//! | [`transport`] | Streams, connections, and the upgrade server |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Builder-style configuration.
pub mod options;

/// Echo session and heartbeat run on each server connection.
pub mod session;

/// WebSocket transport layer.
///
/// Duplex streams, the [`Connection`] façade, and the upgrade [`Server`].
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Option types
pub use options::{ConnectionOptions, ServerOptions, SessionOptions};

// Transport types
pub use transport::{Connection, DuplexStream, MessageKind, Server, WsStream};
