//! Echo server with heartbeat.
//!
//! Demonstrates:
//! - Binding the upgrade server on `/ws`
//! - An echo session per connection
//! - A heartbeat written every second from a second task
//!
//! Usage:
//!   cargo run --example echo_server
//!   cargo run --example echo_server -- --addr 127.0.0.1:9000
//!   cargo run --example echo_server -- --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use common::{Args, DEFAULT_ADDR};
use ws_push::{Result, Server, ServerOptions};

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
    println!("=== Echo Server ===\n");

    let addr = args.addr.as_deref().unwrap_or(DEFAULT_ADDR);

    println!("[1] Binding server...");
    let server = Server::start(addr, ServerOptions::default()).await?;
    println!("    ✓ Listening on {}", server.ws_url());
    println!("    Heartbeat: every 1s\n");

    common::wait_for_exit(args.no_wait).await;

    println!("\n[Cleanup] Shutting down...");
    println!("          {} live connection(s)", server.connection_count());
    server.shutdown().await;
    println!("          ✓ Done");

    Ok(())
}
