//! # tutoria-relay
//!
//! Reference relay server for the tutoria chat stack.
//!
//! This binary provides:
//! - the **WebSocket event channel** (`/ws`): presence announcements,
//!   room membership, and message delivery with durable ids and bounded
//!   in-memory history
//! - **Notification fanout** with per-identity read state
//! - a **REST API** (axum) serving the bootstrap routes the client calls
//!   at startup, with bearer-token identities as a dev stand-in

mod api;
mod config;
mod error;
mod hub;
mod session;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::RelayConfig;
use crate::hub::ChatHub;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tutoria_relay=debug")),
        )
        .init();

    info!("Starting tutoria relay v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = RelayConfig::from_env();
    info!(?config, "Loaded configuration");
    info!(
        instance = %config.instance_name,
        history_limit = config.history_limit,
        "Relay instance settings"
    );

    // -----------------------------------------------------------------------
    // 3. Initialize the hub and application state
    // -----------------------------------------------------------------------
    let http_addr = config.http_addr;
    let state = AppState {
        hub: ChatHub::new(config.history_limit),
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
