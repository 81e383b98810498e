//! Echo bot: repeats every group and private message back to its sender.
//!
//! Demonstrates:
//! - Registering typed event handlers and lifecycle hooks
//! - Binding the WebSocket listener bots connect to
//! - Typed peer actions with `MessageChain`
//!
//! Usage:
//!   cargo run --example echo_bot
//!   cargo run --example echo_bot -- 0.0.0.0:8081
//!   cargo run --example echo_bot -- 127.0.0.1:8081 --debug

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;

use botwire::{Handlers, MessageChain, Registry, Result, Server, SessionConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_ADDR: &str = "127.0.0.1:8081";

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    init_logging(args.iter().any(|arg| arg == "--debug"));

    let addr = args
        .iter()
        .find(|arg| !arg.starts_with("--"))
        .map_or(DEFAULT_ADDR, String::as_str);

    if let Err(e) = run(addr).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(addr: &str) -> Result<()> {
    println!("=== Echo Bot ===\n");

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| botwire::Error::config(format!("invalid listen address {addr:?}: {e}")))?;

    let handlers = Handlers::new()
        .on_connect(|session| async move {
            match session.get_login_info().await {
                Ok(login) => info!(bot_id = %session.bot_id(), nickname = %login.nickname, "Bot online"),
                Err(e) => warn!(bot_id = %session.bot_id(), error = %e, "Login info unavailable"),
            }
        })
        .on_disconnect(|session| async move {
            info!(bot_id = %session.bot_id(), stats = ?session.stats(), "Bot offline");
        })
        .on_group_message(|session, event| async move {
            let reply = MessageChain::new()
                .at(event.user_id)
                .text(format!(" {}", event.raw_message));

            if let Err(e) = session.send_group_msg(event.group_id, reply, false).await {
                warn!(group_id = event.group_id, error = %e, "Group echo failed");
            }
        })
        .on_private_message(|session, event| async move {
            let reply = MessageChain::new().text(event.raw_message);

            if let Err(e) = session.send_private_msg(event.user_id, reply, false).await {
                warn!(user_id = event.user_id, error = %e, "Private echo failed");
            }
        });

    let registry = Registry::new(SessionConfig::from_env(), handlers)?;
    let server = Server::bind(addr, registry).await?;

    println!("Listening on {}", server.ws_url());
    println!("Press Ctrl+C to exit...");

    tokio::signal::ctrl_c().await?;

    server.shutdown();
    println!("\n=== Done ===");
    Ok(())
}

// ============================================================================
// Logging
// ============================================================================

fn init_logging(debug: bool) {
    let filter = if debug { "botwire=debug,echo_bot=debug" } else { "botwire=info,echo_bot=info" };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}
