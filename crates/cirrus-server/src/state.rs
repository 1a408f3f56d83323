// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Application state shared by the HTTP handlers.

use std::str::FromStr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;
use uuid::Uuid;

use cirrus_core::events::StoreNotifier;
use cirrus_core::instance::Instance;
use cirrus_core::migrations;
use cirrus_core::persistence::{PostgresStore, SqliteStore};
use cirrus_core::{LifecycleState, RequestContext};

use crate::config::{Config, DatabaseKind};
use crate::demo::DemoPresenter;
use crate::error::Result;

/// State handed to every route.
#[derive(Clone)]
pub struct AppState {
    lifecycle: LifecycleState,
    demo: Option<DemoPresenter>,
}

impl AppState {
    /// Wrap lifecycle state. Demo presentation is off.
    pub fn new(lifecycle: LifecycleState) -> Self {
        Self {
            lifecycle,
            demo: None,
        }
    }

    /// Turn demo presentation on or off.
    pub fn with_demo(mut self, demo: bool) -> Self {
        self.demo = demo.then_some(DemoPresenter);
        self
    }

    /// Whether demo mode is on.
    pub fn is_demo(&self) -> bool {
        self.demo.is_some()
    }

    /// Lifecycle state.
    pub fn lifecycle(&self) -> &LifecycleState {
        &self.lifecycle
    }

    /// Handler context for one organization.
    pub fn scoped(&self, organization: Uuid) -> RequestContext<'_> {
        self.lifecycle.scoped(organization)
    }

    /// Apply the demo presentation, if enabled.
    pub fn present(&self, instance: Instance) -> Instance {
        match &self.demo {
            Some(presenter) => presenter.present(instance),
            None => instance,
        }
    }

    /// Apply the demo presentation to a list, if enabled.
    pub fn present_all(&self, instances: Vec<Instance>) -> Vec<Instance> {
        match &self.demo {
            Some(presenter) => presenter.present_all(instances),
            None => instances,
        }
    }
}

/// Connect to the configured database, apply migrations and build the state.
///
/// Change notifications are recorded in the `events` table.
pub async fn connect(config: &Config) -> Result<AppState> {
    let lifecycle = match config.database {
        DatabaseKind::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(&config.database_url)
                .await?;
            info!("Connected to PostgreSQL");

            migrations::run_postgres(&pool).await?;
            info!("Database migrations applied");

            let store = Arc::new(PostgresStore::new(pool));
            LifecycleState::from_store(store.clone(), Arc::new(StoreNotifier::new(store)))
        }
        DatabaseKind::Sqlite => {
            let options =
                SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
            let pool = SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .connect_with(options)
                .await?;
            info!("Connected to SQLite");

            migrations::run_sqlite(&pool).await?;
            info!("Database migrations applied");

            let store = Arc::new(SqliteStore::new(pool));
            LifecycleState::from_store(store.clone(), Arc::new(StoreNotifier::new(store)))
        }
    };

    Ok(AppState::new(lifecycle).with_demo(config.demo))
}
