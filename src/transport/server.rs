//! WebSocket upgrade server.
//!
//! Accepts TCP connections, performs the HTTP upgrade handshake, and runs an
//! echo [`session`](crate::session) on every resulting [`Connection`].
//!
//! # Connection Flow
//!
//! 1. [`Server::bind`] binds the listener; [`Server::run`] drives the accept
//!    loop ([`Server::start`] does both)
//! 2. Each socket is upgraded within `handshake_timeout`; other paths get 404
//! 3. The WebSocket is wrapped in [`WsStream`] and opened as a [`Connection`]
//! 4. The connection is registered and served until it closes
//! 5. [`Server::shutdown`] stops accepting and closes every connection

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::options::ServerOptions;
use crate::session;

use super::{Connection, WsStream};

// ============================================================================
// Server
// ============================================================================

/// Upgrade server running an echo session per connection.
///
/// # Example
///
/// ```ignore
/// use ws_push::{Server, ServerOptions};
///
/// let server = Server::start("127.0.0.1:7777", ServerOptions::default()).await?;
/// println!("Listening on {}", server.ws_url());
///
/// tokio::signal::ctrl_c().await?;
/// server.shutdown().await;
/// ```
pub struct Server {
    /// Address the listener is bound to.
    local_addr: SocketAddr,

    /// Server configuration.
    options: ServerOptions,

    /// Bound listener, taken by [`run`](Self::run).
    listener: Mutex<Option<TcpListener>>,

    /// Live connections by id.
    connections: RwLock<FxHashMap<Uuid, Connection>>,

    /// Stops the accept loop.
    shutdown: CancellationToken,
}

// ============================================================================
// Server - Constructor
// ============================================================================

impl Server {
    /// Binds the listener without accepting yet.
    ///
    /// Use port 0 to let the OS assign a random available port. Sockets
    /// queue in the OS backlog until [`run`](Self::run) is driven.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `options` are invalid
    /// - [`Error::Io`] if binding fails
    pub async fn bind(addr: impl ToSocketAddrs, options: ServerOptions) -> Result<Arc<Self>> {
        options.validate()?;

        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        info!(%local_addr, path = %options.path, "Server bound");

        Ok(Arc::new(Self {
            local_addr,
            options,
            listener: Mutex::new(Some(listener)),
            connections: RwLock::new(FxHashMap::default()),
            shutdown: CancellationToken::new(),
        }))
    }

    /// Binds the listener and spawns [`run`](Self::run) in the background.
    ///
    /// # Errors
    ///
    /// Same as [`bind`](Self::bind).
    pub async fn start(addr: impl ToSocketAddrs, options: ServerOptions) -> Result<Arc<Self>> {
        let server = Self::bind(addr, options).await?;

        let server_clone = Arc::clone(&server);
        tokio::spawn(async move {
            if let Err(e) = server_clone.run().await {
                error!(error = %e, "Server stopped");
            }
        });

        Ok(server)
    }
}

// ============================================================================
// Server - Public API
// ============================================================================

impl Server {
    /// Returns the address the listener is bound to.
    #[inline]
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the WebSocket URL clients should connect to.
    ///
    /// Format: `ws://{addr}{path}`
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}{}", self.local_addr, self.options.path)
    }

    /// Returns the server configuration.
    #[inline]
    #[must_use]
    pub const fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Returns the number of live connections.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Accepts sockets until [`shutdown`](Self::shutdown) is called.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the server is already running.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let listener = self
            .listener
            .lock()
            .take()
            .ok_or_else(|| Error::config("Server is already running"))?;

        info!(local_addr = %self.local_addr, "Server started");
        self.accept_loop(listener).await;

        Ok(())
    }

    /// Stops accepting and closes every live connection.
    pub async fn shutdown(&self) {
        info!("Server shutting down");

        self.shutdown.cancel();

        let connections: Vec<_> = {
            let mut map = self.connections.write();
            map.drain().map(|(_, connection)| connection).collect()
        };

        for connection in connections {
            connection.close().await;
            debug!(connection_id = %connection.id(), "Connection closed during shutdown");
        }

        info!("Server shutdown complete");
    }
}

// ============================================================================
// Server - Accept Loop
// ============================================================================

impl Server {
    /// Background task that accepts new sockets.
    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        debug!("Accept loop started");

        loop {
            let accepted = tokio::select! {
                () = self.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, addr)) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream, addr).await {
                            warn!(error = %e, %addr, "Connection handling failed");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Accept failed");
                }
            }
        }

        debug!("Accept loop terminated");
    }

    /// Upgrades one socket and serves it until the connection closes.
    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        debug!(%addr, "TCP connection accepted");

        let path = self.options.path.clone();
        let check_path = move |request: &Request, response: Response| {
            if request.uri().path() == path {
                Ok(response)
            } else {
                let mut refusal = ErrorResponse::new(Some("Not Found".to_string()));
                *refusal.status_mut() = StatusCode::NOT_FOUND;
                Err(refusal)
            }
        };

        let handshake_timeout = self.options.handshake_timeout;
        let ws_stream = timeout(handshake_timeout, accept_hdr_async(stream, check_path))
            .await
            .map_err(|_| Error::timed_out(handshake_timeout))?
            .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

        let stream = WsStream::with_kind(ws_stream, self.options.message_kind);
        let connection = Connection::with_options(stream, self.options.connection.clone())?;
        let id = connection.id();

        self.connections.write().insert(id, connection.clone());
        info!(connection_id = %id, %addr, "WebSocket connection established");

        // shutdown() may have drained the map before this insert
        if self.shutdown.is_cancelled() {
            connection.close().await;
        }

        session::serve(connection, &self.options.session).await;

        self.connections.write().remove(&id);
        info!(connection_id = %id, %addr, "WebSocket connection finished");

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
