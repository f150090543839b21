//! Thread-safe connection over a duplex stream.
//!
//! A [`Connection`] turns a blocking, non-reentrant [`DuplexStream`] into two
//! bounded message queues that any number of tasks can use concurrently.
//!
//! # Pumps
//!
//! Opening a connection spawns two tokio tasks:
//!
//! - **Read pump**: `stream.receive()` → inbound queue → [`Connection::read_message`]
//! - **Write pump**: [`Connection::write_message`] → outbound queue → `stream.send()`
//!
//! Any stream error is fatal: the pump that sees it calls
//! [`Connection::close`], which closes the stream and fires the shutdown
//! signal. Every blocked or future `read_message`/`write_message` then
//! returns [`Error::ConnectionClosed`].
//!
//! # Lifecycle
//!
//! ```text
//! Running ──close()──► Closing ──stream closed, signal fired──► Closed
//! ```
//!
//! Only the first `close` leaves `Running`; later calls wait for the signal.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::options::ConnectionOptions;

use super::DuplexStream;

// ============================================================================
// State
// ============================================================================

/// Shutdown progress of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Pumps are moving messages.
    Running,
    /// The stream is being closed; the signal has not fired yet.
    Closing,
    /// The stream is closed and the signal has fired.
    Closed,
}

// ============================================================================
// Shared
// ============================================================================

/// State shared by every handle and both pumps.
struct Shared {
    /// Identifier used in log fields.
    id: Uuid,
    /// Underlying stream; touched only by the pumps and `close`.
    stream: Box<dyn DuplexStream>,
    /// One-shot shutdown signal.
    shutdown: CancellationToken,
    /// Guards the single Running → Closing transition.
    state: Mutex<State>,
    /// Tracks the two pump tasks.
    pumps: TaskTracker,
}

impl Shared {
    /// Closes the stream and fires the shutdown signal, once.
    ///
    /// Every caller returns only after the signal has fired, including
    /// callers that lose the race to the first one.
    async fn close(&self) {
        let first = {
            let mut state = self.state.lock();
            let first = *state == State::Running;
            if first {
                *state = State::Closing;
            }
            first
        };

        if !first {
            self.shutdown.cancelled().await;
            return;
        }

        if let Err(e) = self.stream.close().await {
            debug!(connection_id = %self.id, error = %e, "Stream close failed");
        }

        self.shutdown.cancel();
        *self.state.lock() = State::Closed;

        debug!(connection_id = %self.id, "Connection closed");
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Concurrent message façade over one duplex stream.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and cheap to clone; all clones share the
/// same queues and shutdown signal. `read_message`, `write_message`, and
/// `close` may be called from any number of tasks at once.
///
/// Dropping every clone without calling [`close`](Self::close) also shuts
/// the connection down.
pub struct Connection {
    /// State shared with the pumps.
    shared: Arc<Shared>,
    /// Producer side of the outbound queue.
    outbound: mpsc::Sender<Vec<u8>>,
    /// Consumer side of the inbound queue, shared by all readers.
    inbound: Arc<AsyncMutex<mpsc::Receiver<Vec<u8>>>>,
}

impl Clone for Connection {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            outbound: self.outbound.clone(),
            inbound: Arc::clone(&self.inbound),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.shared.id)
            .field("state", &*self.shared.state.lock())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Opens a connection over an established stream with default options.
    ///
    /// Spawns the read and write pumps and returns without waiting for them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if called outside a Tokio runtime.
    pub fn open(stream: impl DuplexStream) -> Result<Self> {
        Self::with_options(stream, ConnectionOptions::default())
    }

    /// Opens a connection with custom options.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `options` are invalid
    /// - [`Error::Config`] if called outside a Tokio runtime
    pub fn with_options(stream: impl DuplexStream, options: ConnectionOptions) -> Result<Self> {
        options.validate()?;

        let runtime = Handle::try_current()
            .map_err(|e| Error::config(format!("Connection requires a Tokio runtime: {e}")))?;

        let (inbound_tx, inbound_rx) = mpsc::channel(options.capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(options.capacity);

        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            stream: Box::new(stream),
            shutdown: CancellationToken::new(),
            state: Mutex::new(State::Running),
            pumps: TaskTracker::new(),
        });

        shared
            .pumps
            .spawn_on(Self::read_pump(Arc::clone(&shared), inbound_tx), &runtime);
        shared
            .pumps
            .spawn_on(Self::write_pump(Arc::clone(&shared), outbound_rx), &runtime);
        shared.pumps.close();

        debug!(connection_id = %shared.id, capacity = options.capacity, "Connection opened");

        Ok(Self {
            shared,
            outbound: outbound_tx,
            inbound: Arc::new(AsyncMutex::new(inbound_rx)),
        })
    }

    /// Returns the connection identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Returns `true` once shutdown has been initiated.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.shared.state.lock() != State::Running
    }

    /// Waits for the next inbound message.
    ///
    /// Messages already queued when the connection closes are still
    /// delivered, in order, before the closed error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] once the shutdown signal has fired
    /// and the inbound queue is empty.
    pub async fn read_message(&self) -> Result<Vec<u8>> {
        let shutdown = &self.shared.shutdown;

        let mut inbound = tokio::select! {
            biased;
            guard = self.inbound.lock() => guard,
            () = shutdown.cancelled() => return Err(Error::ConnectionClosed),
        };

        tokio::select! {
            biased;
            message = inbound.recv() => message.ok_or(Error::ConnectionClosed),
            () = shutdown.cancelled() => Err(Error::ConnectionClosed),
        }
    }

    /// Queues a message for the write pump.
    ///
    /// Waits while the outbound queue is full. `Ok` acknowledges queueing
    /// only, not delivery.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the shutdown signal has fired;
    /// the message is discarded.
    pub async fn write_message(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        let data = data.into();

        tokio::select! {
            biased;
            () = self.shared.shutdown.cancelled() => Err(Error::ConnectionClosed),
            result = self.outbound.send(data) => result.map_err(|_| Error::ConnectionClosed),
        }
    }

    /// Closes the stream and fires the shutdown signal.
    ///
    /// Idempotent and safe to call concurrently. Only the first call closes
    /// the stream; every call returns once the shutdown signal has fired.
    pub async fn close(&self) {
        self.shared.close().await;
    }

    /// Waits until the shutdown signal has fired.
    pub async fn closed(&self) {
        self.shared.shutdown.cancelled().await;
    }

    /// Waits until the shutdown signal has fired and both pumps have exited.
    pub async fn wait_closed(&self) {
        self.shared.shutdown.cancelled().await;
        self.shared.pumps.wait().await;
    }

    /// Moves messages from the stream to the inbound queue.
    async fn read_pump(shared: Arc<Shared>, inbound: mpsc::Sender<Vec<u8>>) {
        loop {
            let received = tokio::select! {
                biased;
                () = shared.shutdown.cancelled() => break,
                received = shared.stream.receive() => received,
            };

            let data = match received {
                Ok(data) => data,
                Err(e) => {
                    debug!(connection_id = %shared.id, error = %e, "Receive failed");
                    break;
                }
            };

            trace!(connection_id = %shared.id, len = data.len(), "Message received");

            tokio::select! {
                biased;
                () = shared.shutdown.cancelled() => break,
                result = inbound.send(data) => {
                    if result.is_err() {
                        debug!(connection_id = %shared.id, "Inbound queue dropped");
                        break;
                    }
                }
            }
        }

        shared.close().await;
        debug!(connection_id = %shared.id, "Read pump exited");
    }

    /// Moves messages from the outbound queue to the stream.
    async fn write_pump(shared: Arc<Shared>, mut outbound: mpsc::Receiver<Vec<u8>>) {
        loop {
            let data = tokio::select! {
                biased;
                () = shared.shutdown.cancelled() => break,
                data = outbound.recv() => match data {
                    Some(data) => data,
                    None => {
                        debug!(connection_id = %shared.id, "All connection handles dropped");
                        break;
                    }
                },
            };

            let len = data.len();
            if let Err(e) = shared.stream.send(data).await {
                debug!(connection_id = %shared.id, error = %e, "Send failed");
                break;
            }

            trace!(connection_id = %shared.id, len, "Message sent");
        }

        shared.close().await;
        debug!(connection_id = %shared.id, "Write pump exited");
    }
}

// ============================================================================
// Tests
// ============================================================================
