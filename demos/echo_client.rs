//! Echo client built on `Connection`.
//!
//! Demonstrates:
//! - Opening a `Connection` over a client-side WebSocket
//! - Reading from one task while writing from another
//! - Treating the closed error as terminal
//!
//! Usage:
//!   cargo run --example echo_client
//!   cargo run --example echo_client -- --url ws://127.0.0.1:9000/ws
//!   cargo run --example echo_client -- --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use common::{Args, DEFAULT_URL};
use ws_push::{Connection, Result, WsStream};

// ============================================================================
// Constants
// ============================================================================

const MESSAGE_COUNT: usize = 5;

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== Echo Client ===\n");

    let url = args.url.as_deref().unwrap_or(DEFAULT_URL);

    // ========================================================================
    // Connect
    // ========================================================================

    println!("[1] Connecting to {url}...");
    let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
    let connection = Connection::open(WsStream::new(ws_stream))?;
    println!("    ✓ Connection {} open\n", connection.id());

    // ========================================================================
    // Reader Task
    // ========================================================================

    let reader = {
        let connection = connection.clone();
        tokio::spawn(async move {
            while let Ok(data) = connection.read_message().await {
                println!("    ← {}", String::from_utf8_lossy(&data));
            }
            println!("    [reader] connection closed");
        })
    };

    // ========================================================================
    // Writes
    // ========================================================================

    println!("[2] Sending {MESSAGE_COUNT} messages...");
    for i in 1..=MESSAGE_COUNT {
        let text = format!("hello #{i}");
        if connection.write_message(text.clone()).await.is_err() {
            println!("    ✗ Connection closed, stopping");
            break;
        }
        println!("    → {text}");
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    println!();

    common::wait_for_exit(args.no_wait).await;

    // ========================================================================
    // Cleanup
    // ========================================================================

    println!("\n[Cleanup] Closing connection...");
    connection.close().await;
    let _ = reader.await;
    connection.wait_closed().await;
    println!("          ✓ Done");

    Ok(())
}
