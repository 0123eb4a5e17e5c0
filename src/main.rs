// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Strava Webhook Relay Service
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `PORT` / `BIND_ADDR`: listen address (default: 0.0.0.0:8080)
//! - `UI_AUTH_TOKEN`: UI login credential
//! - `STRAVA_CLIENT_ID`, `STRAVA_CLIENT_SECRET`: API credentials
//! - `STRAVA_WEBHOOK_VERIFY_TOKEN`: handshake secret
//! - `WEBHOOK_BASE_URL`: public base URL for the callback
//! - `FORWARD_URLS`: comma-separated downstream targets
//! - `AUTH_HEADER_NAME`, `AUTH_HEADER_TOKEN`: header attached to forwards
//! - `SESSION_SECRET`: HMAC key for session cookies (random when unset)

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use strava_webhook_relay::{
    config::Config,
    handlers::AppState,
    server::{serve, shutdown_signal},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::from_env();
    info!(
        bind_addr = %config.bind_addr,
        forward_targets = config.relay.forward_urls.len(),
        max_attempts = config.auth.max_attempts,
        block_secs = config.auth.block_duration_secs,
        "Starting Strava webhook relay"
    );

    let addr: SocketAddr = config.bind_addr.parse()?;
    let state = Arc::new(AppState::from_config(config)?);

    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    serve(listener, state, shutdown_signal()).await?;

    info!("Server stopped");
    Ok(())
}
