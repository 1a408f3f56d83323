// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for cirrus-server.

use std::net::SocketAddr;

/// Backing database selected by the URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    /// `postgres://` or `postgresql://`
    Postgres,
    /// `sqlite:`
    Sqlite,
}

impl DatabaseKind {
    fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(Self::Postgres)
        } else if url.starts_with("sqlite:") {
            Some(Self::Sqlite)
        } else {
            None
        }
    }
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,
    /// Backend chosen from `database_url`
    pub database: DatabaseKind,
    /// HTTP listen address
    pub http_addr: SocketAddr,
    /// Connection pool size
    pub max_connections: u32,
    /// Serve demo responses and reject mutations
    pub demo: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("CIRRUS_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("CIRRUS_DATABASE_URL"))?;

        let database = DatabaseKind::from_url(&database_url).ok_or(ConfigError::Invalid {
            name: "CIRRUS_DATABASE_URL",
            reason: "expected a postgres:// or sqlite: URL",
        })?;

        let port: u16 = std::env::var("CIRRUS_HTTP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid {
                name: "CIRRUS_HTTP_PORT",
                reason: "expected a port number",
            })?;

        let http_addr = SocketAddr::from(([0, 0, 0, 0], port));

        let max_connections: u32 = std::env::var("CIRRUS_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::Invalid {
                name: "CIRRUS_DB_MAX_CONNECTIONS",
                reason: "expected a positive integer",
            })?;

        let demo = std::env::var("CIRRUS_DEMO")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Ok(Self {
            database_url,
            database,
            http_addr,
            max_connections,
            demo,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    /// An environment variable has an unusable value.
    #[error("Invalid value for {name}: {reason}")]
    Invalid {
        /// Variable name
        name: &'static str,
        /// What was expected
        reason: &'static str,
    },
}
