//! Connection, server, and session configuration.
//!
//! Type-safe builders for the knobs of each layer:
//!
//! | Type | Configures |
//! |------|------------|
//! | [`ConnectionOptions`] | Queue capacity of a [`Connection`](crate::Connection) |
//! | [`SessionOptions`] | Heartbeat of the echo session |
//! | [`ServerOptions`] | Upgrade path, handshake timeout, and the two above |
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use ws_push::ServerOptions;
//!
//! let options = ServerOptions::new()
//!     .with_path("/push")
//!     .with_queue_capacity(64)
//!     .with_heartbeat(Duration::from_secs(5), "ping");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::MessageKind;

// ============================================================================
// Constants
// ============================================================================

/// Default capacity of each message queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Default route accepted for the WebSocket upgrade.
pub const DEFAULT_PATH: &str = "/ws";

/// Default time allowed for the upgrade handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between heartbeat messages.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Default heartbeat payload.
pub const DEFAULT_HEARTBEAT_MESSAGE: &[u8] = b"heart beat";

// ============================================================================
// ConnectionOptions
// ============================================================================

/// Options for opening a [`Connection`](crate::Connection).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Capacity of both the inbound and the outbound queue.
    pub capacity: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionOptions {
    /// Creates options with the default capacity.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Sets the queue capacity.
    #[inline]
    #[must_use]
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the capacity is zero.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::config("Queue capacity must be greater than zero"));
        }
        Ok(())
    }
}

// ============================================================================
// SessionOptions
// ============================================================================

/// Options for the echo session run on every accepted connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Heartbeat interval. `None` disables the heartbeat.
    pub heartbeat_interval: Option<Duration>,

    /// Payload written on every heartbeat.
    pub heartbeat_message: Vec<u8>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionOptions {
    /// Creates options with a one second heartbeat.
    #[must_use]
    pub fn new() -> Self {
        Self {
            heartbeat_interval: Some(DEFAULT_HEARTBEAT_INTERVAL),
            heartbeat_message: DEFAULT_HEARTBEAT_MESSAGE.to_vec(),
        }
    }

    /// Sets the heartbeat interval and payload.
    #[inline]
    #[must_use]
    pub fn with_heartbeat(mut self, interval: Duration, message: impl Into<Vec<u8>>) -> Self {
        self.heartbeat_interval = Some(interval);
        self.heartbeat_message = message.into();
        self
    }

    /// Disables the heartbeat.
    #[inline]
    #[must_use]
    pub fn without_heartbeat(mut self) -> Self {
        self.heartbeat_interval = None;
        self
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the heartbeat interval is zero.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval == Some(Duration::ZERO) {
            return Err(Error::config("Heartbeat interval must be greater than zero"));
        }
        Ok(())
    }
}

// ============================================================================
// ServerOptions
// ============================================================================

/// Options for the upgrade [`Server`](crate::Server).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// Request path accepted for the upgrade.
    pub path: String,

    /// Maximum time for the upgrade handshake of one socket.
    pub handshake_timeout: Duration,

    /// Frame type used for outgoing messages.
    pub message_kind: MessageKind,

    /// Options for every opened connection.
    pub connection: ConnectionOptions,

    /// Options for every session.
    pub session: SessionOptions,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerOptions {
    /// Creates options with defaults (`/ws`, 10s handshake, 1s heartbeat).
    #[must_use]
    pub fn new() -> Self {
        Self {
            path: DEFAULT_PATH.to_string(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            message_kind: MessageKind::Text,
            connection: ConnectionOptions::new(),
            session: SessionOptions::new(),
        }
    }

    /// Sets the upgrade path.
    #[inline]
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the frame type used for outgoing messages.
    #[inline]
    #[must_use]
    pub fn with_message_kind(mut self, kind: MessageKind) -> Self {
        self.message_kind = kind;
        self
    }

    /// Sets the queue capacity of every connection.
    #[inline]
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.connection = self.connection.with_capacity(capacity);
        self
    }

    /// Sets the heartbeat interval and payload.
    #[inline]
    #[must_use]
    pub fn with_heartbeat(mut self, interval: Duration, message: impl Into<Vec<u8>>) -> Self {
        self.session = self.session.with_heartbeat(interval, message);
        self
    }

    /// Disables the heartbeat.
    #[inline]
    #[must_use]
    pub fn without_heartbeat(mut self) -> Self {
        self.session = self.session.without_heartbeat();
        self
    }

    /// Validates the options and every nested option set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the path does not start with `/`, the
    /// handshake timeout is zero, or a nested option set is invalid.
    pub fn validate(&self) -> Result<()> {
        if !self.path.starts_with('/') {
            return Err(Error::config(format!(
                "Upgrade path must start with '/': {}",
                self.path
            )));
        }
        if self.handshake_timeout.is_zero() {
            return Err(Error::config("Handshake timeout must be greater than zero"));
        }
        self.connection.validate()?;
        self.session.validate()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ServerOptions::default();
        assert_eq!(options.path, "/ws");
        assert_eq!(options.handshake_timeout, Duration::from_secs(10));
        assert_eq!(options.message_kind, MessageKind::Text);
        assert_eq!(options.connection.capacity, 1000);
        assert_eq!(options.session.heartbeat_interval, Some(Duration::from_secs(1)));
        assert_eq!(options.session.heartbeat_message, b"heart beat");
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let options = ServerOptions::new()
            .with_path("/push")
            .with_queue_capacity(8)
            .with_heartbeat(Duration::from_millis(250), "hb")
            .with_handshake_timeout(Duration::from_secs(2))
            .with_message_kind(MessageKind::Binary);

        assert_eq!(options.path, "/push");
        assert_eq!(options.connection.capacity, 8);
        assert_eq!(options.session.heartbeat_interval, Some(Duration::from_millis(250)));
        assert_eq!(options.session.heartbeat_message, b"hb");
        assert_eq!(options.handshake_timeout, Duration::from_secs(2));
        assert_eq!(options.message_kind, MessageKind::Binary);
    }

    #[test]
    fn test_without_heartbeat() {
        let options = ServerOptions::new().without_heartbeat();
        assert!(options.session.heartbeat_interval.is_none());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = ConnectionOptions::new().with_capacity(0).validate().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let err = ServerOptions::new().with_queue_capacity(0).validate().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_invalid_server_options() {
        assert!(ServerOptions::new().with_path("ws").validate().is_err());
        assert!(
            ServerOptions::new()
                .with_handshake_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            ServerOptions::new()
                .with_heartbeat(Duration::ZERO, "hb")
                .validate()
                .is_err()
        );
    }
}
