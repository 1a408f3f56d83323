// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cirrus Server - HTTP binding for the lifecycle engine
//!
//! Exposes disks and instances over HTTP. Every resource route acts for the
//! organization named in the `x-organization` header, which the upstream
//! authentication proxy sets.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/disk`, `/instance` | Paged list (`page`, `page_count`) with filters |
//! | `GET` | `/disk/{id}`, `/instance/{id}` | Fetch one |
//! | `POST` | `/disk`, `/instance` | Create (instances: `count` and a `%d` name template) |
//! | `PUT` | `/disk/{id}`, `/instance/{id}` | Update, returns the entity |
//! | `PUT` | `/disk`, `/instance` | Bulk `{ids, state}`, returns `null` |
//! | `DELETE` | `/disk/{id}`, `/instance/{id}` | Delete; absent ids succeed |
//! | `DELETE` | `/disk`, `/instance` | Bulk delete, body `{ids}` or an array of ids |
//! | `GET` | `/check` | Health probe |
//!
//! `GET /instance?node_names=<node>` returns `[{id, name}]` of the instances on
//! that node instead of a page.
//!
//! # Errors
//!
//! | Status | Cause |
//! |--------|-------|
//! | 400 | Validation (`error` carries the code), including malformed bodies (`invalid_json`) and query strings (`invalid_query`) |
//! | 401 | Missing or invalid organization |
//! | 404 | Resource absent or owned by another organization |
//! | 405 | Invalid reference |
//! | 500 | Backing store failure |
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `CIRRUS_DATABASE_URL` | Yes | - | `postgres://...` or `sqlite:...` |
//! | `CIRRUS_HTTP_PORT` | No | `8080` | HTTP listen port |
//! | `CIRRUS_DB_MAX_CONNECTIONS` | No | `10` | Connection pool size |
//! | `CIRRUS_DEMO` | No | `false` | Demo presentation, mutations refused |

#![warn(missing_docs)]

/// Server configuration loaded from environment variables.
pub mod config;

/// Demo presentation and mutation guard.
pub mod demo;

/// Startup and request error types.
pub mod error;

/// Body and query extractors with structured rejections.
pub mod extract;

/// Organization scope extractor.
pub mod org;

/// HTTP routes.
pub mod routes;

/// Application state and database connection.
pub mod state;

pub use config::Config;
pub use error::{ApiError, Error};
pub use routes::create_app;
pub use state::AppState;
