//! Per-connection echo session with a periodic heartbeat.
//!
//! This is the application logic the [`Server`](crate::Server) runs on every
//! accepted connection:
//!
//! - an echo loop writes every inbound message straight back
//! - a heartbeat task writes a fixed payload on an interval
//!
//! Both share one [`Connection`] and stop at the first closed error. A
//! closed write is terminal for the heartbeat; it never retries.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::options::SessionOptions;
use crate::transport::Connection;

// ============================================================================
// Session
// ============================================================================

/// Runs the echo loop until the connection fails, then closes it.
///
/// Starts the heartbeat first when `options` enable one and waits for it to
/// finish before returning.
pub async fn serve(connection: Connection, options: &SessionOptions) {
    let heartbeat_task = options.heartbeat_interval.map(|every| {
        tokio::spawn(heartbeat(
            connection.clone(),
            every,
            options.heartbeat_message.clone(),
        ))
    });

    if let Err(e) = echo(&connection).await {
        debug!(connection_id = %connection.id(), error = %e, "Echo loop ended");
    }

    connection.close().await;

    if let Some(task) = heartbeat_task {
        join_heartbeat(connection.id(), task).await;
    }
}

/// Waits for the heartbeat task, logging a panic or cancellation.
async fn join_heartbeat(connection_id: Uuid, task: JoinHandle<()>) {
    if let Err(e) = task.await {
        warn!(%connection_id, error = %e, "Heartbeat task failed");
    }
}

/// Writes every inbound message back to the peer.
///
/// # Errors
///
/// Returns the first error from `read_message` or `write_message`.
pub async fn echo(connection: &Connection) -> Result<()> {
    loop {
        let data = connection.read_message().await?;
        trace!(connection_id = %connection.id(), len = data.len(), "Echoing message");
        connection.write_message(data).await?;
    }
}

/// Writes `message` every `every` until the connection closes.
///
/// The first heartbeat is written immediately.
pub async fn heartbeat(connection: Connection, every: Duration, message: Vec<u8>) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = connection.closed() => break,
            _ = ticker.tick() => {}
        }

        if let Err(e) = connection.write_message(message.clone()).await {
            debug!(connection_id = %connection.id(), error = %e, "Heartbeat stopped");
            break;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::time::timeout;

    use crate::transport::mock::Script;

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_echo_writes_back() {
        let (stream, handle) = Script::default().build();
        let connection = Connection::open(stream).expect("open");
        let options = SessionOptions::new().without_heartbeat();

        let session = tokio::spawn({
            let connection = connection.clone();
            async move { serve(connection, &options).await }
        });

        handle.push("hello");
        handle.push("world");

        timeout(WAIT, handle.wait_sent(2)).await.expect("echoed");
        assert_eq!(handle.sent(), vec![b"hello".to_vec(), b"world".to_vec()]);

        handle.fail();
        timeout(WAIT, session).await.expect("session ends").expect("join");
        assert!(connection.is_closed());
    }

    #[tokio::test]
    async fn test_echo_returns_closed_error() {
        let (stream, handle) = Script::default().build();
        let connection = Connection::open(stream).expect("open");

        handle.fail();

        let err = timeout(WAIT, echo(&connection)).await.expect("echo").unwrap_err();
        assert!(err.is_closed());
    }

    #[tokio::test]
    async fn test_heartbeat_repeats() {
        let (stream, handle) = Script::default().build();
        let connection = Connection::open(stream).expect("open");

        let task = tokio::spawn(heartbeat(
            connection.clone(),
            Duration::from_millis(10),
            b"heart beat".to_vec(),
        ));

        timeout(WAIT, handle.wait_sent(3)).await.expect("heartbeats");
        assert!(handle.sent().iter().all(|m| m == b"heart beat"));

        connection.close().await;
        timeout(WAIT, task).await.expect("heartbeat stops").expect("join");
    }

    #[tokio::test]
    async fn test_heartbeat_stops_on_send_failure() {
        let (stream, handle) = Script::default().fail_send_after(1).build();
        let connection = Connection::open(stream).expect("open");

        let task = tokio::spawn(heartbeat(
            connection.clone(),
            Duration::from_millis(5),
            b"hb".to_vec(),
        ));

        timeout(WAIT, task).await.expect("heartbeat stops").expect("join");
        assert!(connection.is_closed());
        assert_eq!(handle.sent(), vec![b"hb".to_vec()]);
    }

    #[tokio::test]
    async fn test_join_heartbeat_survives_panic() {
        let task: JoinHandle<()> = tokio::spawn(async { panic!("heartbeat panicked") });

        timeout(WAIT, join_heartbeat(Uuid::new_v4(), task))
            .await
            .expect("join returns");
    }

    #[tokio::test]
    async fn test_serve_runs_heartbeat_until_close() {
        let (stream, handle) = Script::default().build();
        let connection = Connection::open(stream).expect("open");
        let options = SessionOptions::new().with_heartbeat(Duration::from_millis(10), "hb");

        let session = tokio::spawn({
            let connection = connection.clone();
            async move { serve(connection, &options).await }
        });

        timeout(WAIT, handle.wait_sent(2)).await.expect("heartbeats");

        connection.close().await;
        timeout(WAIT, session).await.expect("session ends").expect("join");
        timeout(WAIT, connection.wait_closed()).await.expect("pumps exit");
    }
}
