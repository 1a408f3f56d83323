// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test utilities for cirrus-server tests.
//!
//! Builds the router over an in-memory SQLite store seeded with one
//! organization's placement, network and image records.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use serde_json::Value;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt; // for `oneshot`
use uuid::Uuid;

use cirrus_core::LifecycleState;
use cirrus_core::events::StoreNotifier;
use cirrus_core::migrations;
use cirrus_core::persistence::SqliteStore;
use cirrus_server::{AppState, create_app};

/// Seeded store plus the ids a request needs.
pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    pub org: Uuid,
    pub zone: Uuid,
    pub node: Uuid,
    pub vpc: Uuid,
    pub image: Uuid,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::build(false).await
    }

    pub async fn demo() -> Self {
        Self::build(true).await
    }

    async fn build(demo: bool) -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        migrations::run_sqlite(&pool)
            .await
            .expect("Failed to run migrations");

        let org = Uuid::new_v4();
        let datacenter = Uuid::new_v4();
        let zone = Uuid::new_v4();
        let node = Uuid::new_v4();
        let vpc = Uuid::new_v4();
        let storage = Uuid::new_v4();
        let image = Uuid::new_v4();

        let seeds: [(&str, Vec<Uuid>); 6] = [
            (
                "INSERT INTO datacenters (id, organization, name) VALUES (?, ?, 'dc')",
                vec![datacenter, org],
            ),
            (
                "INSERT INTO zones (id, datacenter, name) VALUES (?, ?, 'zone')",
                vec![zone, datacenter],
            ),
            (
                "INSERT INTO nodes (id, zone, name) VALUES (?, ?, 'node')",
                vec![node, zone],
            ),
            (
                "INSERT INTO vpcs (id, organization, name) VALUES (?, ?, 'vpc')",
                vec![vpc, org],
            ),
            (
                "INSERT INTO storages (id, name, kind) VALUES (?, 'storage', 'aws')",
                vec![storage],
            ),
            (
                "INSERT INTO images (id, organization, name, storage, storage_class) \
                 VALUES (?, NULL, 'image', ?, 'STANDARD')",
                vec![image, storage],
            ),
        ];
        for (sql, binds) in seeds {
            let mut query = sqlx::query(sql);
            for id in binds {
                query = query.bind(id);
            }
            query.execute(&pool).await.expect("Failed to seed");
        }

        let store = Arc::new(SqliteStore::new(pool.clone()));
        let lifecycle =
            LifecycleState::from_store(store.clone(), Arc::new(StoreNotifier::new(store)));
        let app = create_app(AppState::new(lifecycle).with_demo(demo));

        Self {
            app,
            pool,
            org,
            zone,
            node,
            vpc,
            image,
        }
    }

    /// Send a request scoped to the seeded organization.
    pub async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> Response<Body> {
        self.send_as(Some(self.org), method, uri, body).await
    }

    /// Send a request with an explicit (or no) organization header.
    pub async fn send_as(
        &self,
        org: Option<Uuid>,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(org) = org {
            builder = builder.header("x-organization", org.to_string());
        }

        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        self.app.clone().oneshot(request).await.unwrap()
    }

    pub fn disk_body(&self, name: &str) -> Value {
        serde_json::json!({
            "name": name,
            "node": self.node,
            "size": 10,
        })
    }

    pub fn instance_body(&self, name: &str) -> Value {
        serde_json::json!({
            "name": name,
            "zone": self.zone,
            "node": self.node,
            "vpc": self.vpc,
            "image": self.image,
            "memory": 512,
            "processors": 1,
        })
    }

    /// Topics recorded in the events table, oldest first.
    pub async fn event_topics(&self) -> Vec<String> {
        sqlx::query_scalar("SELECT topic FROM events ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .unwrap()
    }
}

/// Helper to extract JSON body from response
pub async fn extract_json_body(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");

    serde_json::from_slice(&body).expect("Failed to deserialize JSON")
}
