//! WebSocket transport layer.
//!
//! This module turns a raw duplex WebSocket into a [`Connection`] that any
//! number of tasks can read from and write to, and provides the upgrade
//! [`Server`] that produces such connections.
//!
//! # Architecture
//!
//! ```text
//!                    ┌──────────────────────── Connection ────────────────────────┐
//!                    │                                                            │
//!  remote peer ──────┼─► stream.receive ─► read pump ──► inbound queue ──────────┼─► read_message
//!                    │                                                            │
//!  remote peer ◄─────┼── stream.send ◄──── write pump ◄── outbound queue ◄───────┼── write_message
//!                    │                                                            │
//!                    │            shutdown signal ──► both pumps + all callers    │
//!                    └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `stream` | [`DuplexStream`] trait and [`WsStream`] implementation |
//! | `connection` | Pumps, bounded queues, and coordinated shutdown |
//! | `server` | WebSocket upgrade listener |

// ============================================================================
// Submodules
// ============================================================================

/// Thread-safe connection with read/write pumps.
pub mod connection;

/// WebSocket upgrade server.
pub mod server;

/// Duplex stream abstraction.
pub mod stream;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::Connection;
pub use server::Server;
pub use stream::{DuplexStream, MessageKind, WsStream};
