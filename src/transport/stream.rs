//! Duplex stream abstraction and its WebSocket implementation.
//!
//! A [`Connection`](super::Connection) never touches a socket directly. It
//! drives a [`DuplexStream`]: blocking-style `receive`/`send`/`close` over
//! whole messages, with one concurrent caller per method.
//!
//! [`WsStream`] implements the trait over a `tokio-tungstenite`
//! [`WebSocketStream`], splitting it into independently locked halves so that
//! the read pump and the write pump never contend.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Time allowed for the Close frame to be flushed.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// DuplexStream
// ============================================================================

/// A full-duplex, message-oriented stream.
///
/// Each method is safe for one concurrent caller; `receive` and `send` may
/// run at the same time. `close` may be called any number of times and must
/// unblock pending `receive`/`send` calls with an error.
#[async_trait]
pub trait DuplexStream: Send + Sync + 'static {
    /// Waits for the next whole message from the peer.
    async fn receive(&self) -> Result<Vec<u8>>;

    /// Writes one whole message to the peer.
    async fn send(&self, data: Vec<u8>) -> Result<()>;

    /// Closes the stream.
    async fn close(&self) -> Result<()>;
}

// ============================================================================
// MessageKind
// ============================================================================

/// Frame type used by [`WsStream::send`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MessageKind {
    /// UTF-8 text frames.
    #[default]
    Text,
    /// Binary frames.
    Binary,
}

impl MessageKind {
    /// Wraps a payload into a frame of this kind.
    fn encode(self, data: Vec<u8>) -> Result<Message> {
        match self {
            Self::Text => String::from_utf8(data)
                .map(Message::text)
                .map_err(|e| Error::protocol(format!("Text payload is not UTF-8: {e}"))),
            Self::Binary => Ok(Message::binary(data)),
        }
    }
}

// ============================================================================
// WsStream
// ============================================================================

/// [`DuplexStream`] over a WebSocket.
///
/// Text and binary frames are both delivered by `receive`; control frames are
/// skipped. A Close frame from the peer ends the stream.
pub struct WsStream<S> {
    /// Write half.
    sink: Mutex<SplitSink<WebSocketStream<S>, Message>>,
    /// Read half.
    source: Mutex<SplitStream<WebSocketStream<S>>>,
    /// Frame type for outgoing messages.
    kind: MessageKind,
    /// Tripped by `close` to abort pending I/O.
    cancel: CancellationToken,
    /// Set by the first `close`.
    close_started: AtomicBool,
}

impl<S> WsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wraps an established WebSocket, sending text frames.
    #[must_use]
    pub fn new(ws_stream: WebSocketStream<S>) -> Self {
        Self::with_kind(ws_stream, MessageKind::Text)
    }

    /// Wraps an established WebSocket, sending frames of `kind`.
    #[must_use]
    pub fn with_kind(ws_stream: WebSocketStream<S>, kind: MessageKind) -> Self {
        let (sink, source) = ws_stream.split();
        Self {
            sink: Mutex::new(sink),
            source: Mutex::new(source),
            kind,
            cancel: CancellationToken::new(),
            close_started: AtomicBool::new(false),
        }
    }

    /// Returns the frame type used for outgoing messages.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        self.kind
    }
}

impl<S> From<WebSocketStream<S>> for WsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn from(ws_stream: WebSocketStream<S>) -> Self {
        Self::new(ws_stream)
    }
}

#[async_trait]
impl<S> DuplexStream for WsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn receive(&self) -> Result<Vec<u8>> {
        let mut source = tokio::select! {
            () = self.cancel.cancelled() => return Err(Error::ConnectionClosed),
            guard = self.source.lock() => guard,
        };

        loop {
            let message = tokio::select! {
                () = self.cancel.cancelled() => return Err(Error::ConnectionClosed),
                message = source.next() => message,
            };

            match message {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().as_bytes().to_vec()),

                Some(Ok(Message::Binary(data))) => return Ok(data.to_vec()),

                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "WebSocket closed by remote");
                    return Err(Error::ConnectionClosed);
                }

                // Ping/Pong are answered by tungstenite
                Some(Ok(other)) => {
                    trace!(?other, "Skipping control frame");
                }

                Some(Err(e)) => return Err(e.into()),

                None => {
                    debug!("WebSocket stream ended");
                    return Err(Error::ConnectionClosed);
                }
            }
        }
    }

    async fn send(&self, data: Vec<u8>) -> Result<()> {
        let message = self.kind.encode(data)?;

        let mut sink = tokio::select! {
            () = self.cancel.cancelled() => return Err(Error::ConnectionClosed),
            guard = self.sink.lock() => guard,
        };

        tokio::select! {
            () = self.cancel.cancelled() => Err(Error::ConnectionClosed),
            result = sink.send(message) => result.map_err(Error::from),
        }
    }

    async fn close(&self) -> Result<()> {
        if self.close_started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        // Pending receive/send release their locks once cancelled
        self.cancel.cancel();

        let close_frame = async {
            let mut sink = self.sink.lock().await;
            sink.close().await
        };

        match timeout(CLOSE_TIMEOUT, close_frame).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::timed_out(CLOSE_TIMEOUT)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
