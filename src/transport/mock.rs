//! Scripted in-memory [`DuplexStream`] for tests.
//!
//! The test keeps a [`ScriptHandle`] to feed inbound messages, inject a
//! receive failure, gate or fail sends, and inspect what was sent and how
//! many times the stream was closed.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

use super::DuplexStream;

// ============================================================================
// Script
// ============================================================================

/// Builder for a scripted stream.
#[derive(Debug, Default)]
pub(crate) struct Script {
    gated: bool,
    fail_send_after: Option<usize>,
    close_delay: Option<Duration>,
}

impl Script {
    /// Every send waits for a permit granted by [`ScriptHandle::release`].
    pub(crate) fn gated(mut self) -> Self {
        self.gated = true;
        self
    }

    /// Sends past the first `count` fail.
    pub(crate) fn fail_send_after(mut self, count: usize) -> Self {
        self.fail_send_after = Some(count);
        self
    }

    /// Every close sleeps for `delay` before completing.
    pub(crate) fn slow_close(mut self, delay: Duration) -> Self {
        self.close_delay = Some(delay);
        self
    }

    pub(crate) fn build(self) -> (ScriptedStream, ScriptHandle) {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let state = Arc::new(State {
            incoming: AsyncMutex::new(incoming_rx),
            sent: Mutex::new(Vec::new()),
            received: AtomicUsize::new(0),
            send_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            send_permits: self.gated.then(|| Semaphore::new(0)),
            fail_send_after: self.fail_send_after,
            close_delay: self.close_delay,
            closed: CancellationToken::new(),
        });

        (
            ScriptedStream(Arc::clone(&state)),
            ScriptHandle {
                state,
                incoming: incoming_tx,
            },
        )
    }
}

struct State {
    incoming: AsyncMutex<mpsc::UnboundedReceiver<Result<Vec<u8>>>>,
    sent: Mutex<Vec<Vec<u8>>>,
    received: AtomicUsize,
    send_calls: AtomicUsize,
    close_calls: AtomicUsize,
    send_permits: Option<Semaphore>,
    fail_send_after: Option<usize>,
    close_delay: Option<Duration>,
    closed: CancellationToken,
}

// ============================================================================
// ScriptedStream
// ============================================================================

pub(crate) struct ScriptedStream(Arc<State>);

#[async_trait]
impl DuplexStream for ScriptedStream {
    async fn receive(&self) -> Result<Vec<u8>> {
        let mut incoming = self.0.incoming.lock().await;
        tokio::select! {
            () = self.0.closed.cancelled() => Err(Error::ConnectionClosed),
            item = incoming.recv() => {
                let item = item.unwrap_or(Err(Error::ConnectionClosed));
                if item.is_ok() {
                    self.0.received.fetch_add(1, Ordering::SeqCst);
                }
                item
            }
        }
    }

    async fn send(&self, data: Vec<u8>) -> Result<()> {
        let call = self.0.send_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(permits) = &self.0.send_permits {
            tokio::select! {
                () = self.0.closed.cancelled() => return Err(Error::ConnectionClosed),
                permit = permits.acquire() => {
                    permit.map_err(|_| Error::ConnectionClosed)?.forget();
                }
            }
        }

        if self.0.fail_send_after.is_some_and(|limit| call >= limit) {
            return Err(Error::connection("scripted send failure"));
        }

        self.0.sent.lock().push(data);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.0.close_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.0.close_delay {
            tokio::time::sleep(delay).await;
        }
        self.0.closed.cancel();
        Ok(())
    }
}

// ============================================================================
// ScriptHandle
// ============================================================================

pub(crate) struct ScriptHandle {
    state: Arc<State>,
    incoming: mpsc::UnboundedSender<Result<Vec<u8>>>,
}

impl ScriptHandle {
    /// Queues a message for `receive`.
    pub(crate) fn push(&self, data: impl Into<Vec<u8>>) {
        let _ = self.incoming.send(Ok(data.into()));
    }

    /// Queues a receive failure.
    pub(crate) fn fail(&self) {
        let _ = self
            .incoming
            .send(Err(Error::connection("scripted receive failure")));
    }

    /// Grants `count` blocked sends.
    pub(crate) fn release(&self, count: usize) {
        if let Some(permits) = &self.state.send_permits {
            permits.add_permits(count);
        }
    }

    pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
        self.state.sent.lock().clone()
    }

    pub(crate) fn send_calls(&self) -> usize {
        self.state.send_calls.load(Ordering::SeqCst)
    }

    /// Number of messages handed out by `receive`.
    pub(crate) fn received(&self) -> usize {
        self.state.received.load(Ordering::SeqCst)
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.state.close_calls.load(Ordering::SeqCst)
    }

    /// Waits until at least `count` messages were sent.
    pub(crate) async fn wait_sent(&self, count: usize) {
        while self.state.sent.lock().len() < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Waits until the stream was closed at least once.
    pub(crate) async fn wait_closed(&self) {
        self.state.closed.cancelled().await;
    }
}
