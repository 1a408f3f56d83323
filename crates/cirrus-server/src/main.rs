// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cirrus Server - Disk and Instance Lifecycle API
//!
//! Connects to PostgreSQL or SQLite, applies migrations and serves the
//! lifecycle routes until interrupted.

use tracing::{info, warn};

use cirrus_server::config::Config;
use cirrus_server::{create_app, state};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cirrus_server=info,cirrus_core=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    // Load configuration
    let config = Config::from_env()?;

    info!(
        http_addr = %config.http_addr,
        database = ?config.database,
        max_connections = config.max_connections,
        demo = config.demo,
        "Starting Cirrus Server"
    );

    let state = state::connect(&config).await?;
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(config.http_addr).await?;
    info!(addr = %config.http_addr, "Cirrus Server ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        })
        .await?;

    info!("Cirrus Server shut down");

    Ok(())
}
