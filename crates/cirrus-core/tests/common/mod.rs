// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for cirrus-core integration tests.
//!
//! Provides a [`Fixture`] backed by an in-memory SQLite store seeded with one
//! organization's placement, network and image records.

#![allow(dead_code)]

use std::sync::Arc;

use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::broadcast;
use uuid::Uuid;

use cirrus_core::disk::{Disk, DiskRequest};
use cirrus_core::disk_handlers;
use cirrus_core::events::{BroadcastNotifier, Topic};
use cirrus_core::instance::{Instance, InstanceRequest};
use cirrus_core::instance_handlers;
use cirrus_core::migrations;
use cirrus_core::persistence::SqliteStore;
use cirrus_core::{LifecycleState, RequestContext};

/// Seeded store plus the ids of one organization's collaborator records.
pub struct Fixture {
    pub store: Arc<SqliteStore>,
    pub notifier: Arc<BroadcastNotifier>,
    pub state: LifecycleState,
    pub org: Uuid,
    pub datacenter: Uuid,
    pub zone: Uuid,
    pub node: Uuid,
    pub vpc: Uuid,
    pub domain: Uuid,
    pub storage: Uuid,
    pub image: Uuid,
}

impl Fixture {
    /// Create a fresh in-memory store and seed it.
    pub async fn new() -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");
        migrations::run_sqlite(&pool)
            .await
            .expect("Failed to run migrations");

        let org = Uuid::new_v4();
        let datacenter = seed_datacenter(&pool, Some(org)).await;
        let zone = seed_zone(&pool, datacenter).await;
        let node = seed_node(&pool, zone).await;
        let vpc = seed_vpc(&pool, org).await;
        let domain = seed_domain(&pool, org).await;
        let storage = seed_storage(&pool, "aws").await;
        let image = seed_image(&pool, None, storage, "STANDARD", None).await;

        let store = Arc::new(SqliteStore::new(pool));
        let notifier = Arc::new(BroadcastNotifier::new(256));
        let state = LifecycleState::from_store(store.clone(), notifier.clone());

        Self {
            store,
            notifier,
            state,
            org,
            datacenter,
            zone,
            node,
            vpc,
            domain,
            storage,
            image,
        }
    }

    /// Request context for the seeded organization.
    pub fn ctx(&self) -> RequestContext<'_> {
        self.state.scoped(self.org)
    }

    /// Request context for an unrelated organization.
    pub fn foreign_ctx(&self) -> RequestContext<'_> {
        self.state.scoped(Uuid::new_v4())
    }

    pub fn pool(&self) -> &SqlitePool {
        self.store.pool()
    }

    /// A valid detached disk request on the seeded node.
    pub fn disk_request(&self) -> DiskRequest {
        DiskRequest {
            name: "data".to_string(),
            node: Some(self.node),
            size: 20,
            ..Default::default()
        }
    }

    /// A valid single-instance request in the seeded zone.
    pub fn instance_request(&self) -> InstanceRequest {
        InstanceRequest {
            name: "web".to_string(),
            zone: Some(self.zone),
            node: Some(self.node),
            vpc: Some(self.vpc),
            image: Some(self.image),
            memory: 1024,
            processors: 2,
            ..Default::default()
        }
    }

    pub async fn create_disk(&self, request: DiskRequest) -> Disk {
        disk_handlers::handle_create_disk(&self.ctx(), request)
            .await
            .expect("Failed to create disk")
    }

    pub async fn create_instance(&self) -> Instance {
        instance_handlers::handle_create_instances(&self.ctx(), self.instance_request())
            .await
            .expect("Failed to create instance")
            .into_vec()
            .remove(0)
    }

    /// Attach a new disk to `instance` at `index`.
    pub async fn create_attached_disk(&self, instance: &Instance, index: &str) -> Disk {
        let request = DiskRequest {
            instance: Some(instance.id),
            index: index.to_string(),
            ..self.disk_request()
        };
        self.create_disk(request).await
    }

    /// Simulate the hypervisor agent writing runtime attributes.
    pub async fn agent_report(&self, instance: Uuid, vm_state: &str, public_ip: &str) {
        sqlx::query("UPDATE instances SET vm_state = ?, public_ips = json_array(?) WHERE id = ?")
            .bind(vm_state)
            .bind(public_ip)
            .bind(instance)
            .execute(self.pool())
            .await
            .expect("Failed to write agent attributes");
    }

    /// Simulate another subsystem requesting a restart.
    pub async fn request_restart(&self, instance: Uuid) {
        sqlx::query("UPDATE instances SET restart = 1, restart_block_ip = 1 WHERE id = ?")
            .bind(instance)
            .execute(self.pool())
            .await
            .expect("Failed to request restart");
    }

    /// Protect any row of `table` the moment a delete reaches it, as a
    /// concurrent update that lands first would.
    pub async fn protect_on_delete(&self, table: &str) {
        let sql = format!(
            "CREATE TRIGGER protect_{table} BEFORE DELETE ON {table} BEGIN \
             UPDATE {table} SET delete_protection = 1 WHERE id = OLD.id; \
             SELECT RAISE(IGNORE); END"
        );
        sqlx::query(&sql)
            .execute(self.pool())
            .await
            .expect("Failed to create trigger");
    }

    /// Simulate the agent finishing work on a disk.
    pub async fn agent_set_disk_state(&self, disk: Uuid, state: &str) {
        sqlx::query("UPDATE disks SET state = ? WHERE id = ?")
            .bind(state)
            .bind(disk)
            .execute(self.pool())
            .await
            .expect("Failed to write disk state");
    }
}

pub async fn seed_datacenter(pool: &SqlitePool, organization: Option<Uuid>) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO datacenters (id, organization, name) VALUES (?, ?, 'dc')")
        .bind(id)
        .bind(organization)
        .execute(pool)
        .await
        .expect("Failed to seed datacenter");
    id
}

pub async fn seed_zone(pool: &SqlitePool, datacenter: Uuid) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO zones (id, datacenter, name) VALUES (?, ?, 'zone')")
        .bind(id)
        .bind(datacenter)
        .execute(pool)
        .await
        .expect("Failed to seed zone");
    id
}

pub async fn seed_node(pool: &SqlitePool, zone: Uuid) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO nodes (id, zone, name) VALUES (?, ?, 'node')")
        .bind(id)
        .bind(zone)
        .execute(pool)
        .await
        .expect("Failed to seed node");
    id
}

pub async fn seed_vpc(pool: &SqlitePool, organization: Uuid) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO vpcs (id, organization, name) VALUES (?, ?, 'vpc')")
        .bind(id)
        .bind(organization)
        .execute(pool)
        .await
        .expect("Failed to seed vpc");
    id
}

pub async fn seed_domain(pool: &SqlitePool, organization: Uuid) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO domains (id, organization, name) VALUES (?, ?, 'example.com')")
        .bind(id)
        .bind(organization)
        .execute(pool)
        .await
        .expect("Failed to seed domain");
    id
}

pub async fn seed_storage(pool: &SqlitePool, kind: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO storages (id, name, kind) VALUES (?, 'storage', ?)")
        .bind(id)
        .bind(kind)
        .execute(pool)
        .await
        .expect("Failed to seed storage");
    id
}

pub async fn seed_image(
    pool: &SqlitePool,
    organization: Option<Uuid>,
    storage: Uuid,
    storage_class: &str,
    disk: Option<Uuid>,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO images (id, organization, name, storage, storage_class, disk) \
         VALUES (?, ?, 'image', ?, ?, ?)",
    )
    .bind(id)
    .bind(organization)
    .bind(storage)
    .bind(storage_class)
    .bind(disk)
    .execute(pool)
    .await
    .expect("Failed to seed image");
    id
}

/// Topics published so far, without waiting.
pub fn drain(rx: &mut broadcast::Receiver<Topic>) -> Vec<Topic> {
    let mut topics = Vec::new();
    while let Ok(topic) = rx.try_recv() {
        topics.push(topic);
    }
    topics
}

/// Helper macro to skip tests if TEST_DATABASE_URL is not set.
#[macro_export]
macro_rules! skip_if_no_db {
    () => {
        if std::env::var("TEST_DATABASE_URL").is_err() {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        }
    };
}
