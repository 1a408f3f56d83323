// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends.
//!
//! The store is the only writer of disk and instance rows. Updates go through
//! `commit_*`, which writes exactly the columns named by a [`FieldSet`] so that
//! attributes maintained by other writers (the hypervisor agent in particular)
//! are never overwritten with stale values.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresStore;
pub use self::sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::disk::{Disk, DiskField, DiskFilter, DiskState};
use crate::error::Result;
use crate::events::Topic;
use crate::field_set::FieldSet;
use crate::instance::{Instance, InstanceField, InstanceFilter, InstanceName, InstanceState};

/// Columns selected for a [`Disk`], in struct order.
pub(crate) const DISK_COLUMNS: &str = "id, organization, node, instance, name, comment, \
    disk_index, size, new_size, delete_protection, backup, backing, state, image, restore_image";

/// Columns selected for an [`Instance`], in struct order.
pub(crate) const INSTANCE_COLUMNS: &str = "id, organization, zone, node, vpc, domain, name, \
    state, memory, processors, network_roles, vnc, vnc_password, vnc_display, delete_protection, \
    no_public_address, no_host_address, image, image_backing, init_disk_size, restart, \
    restart_block_ip, vm_state, public_ips, public_ips6, private_ips, private_ips6";

/// Paging window for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Zero-based page number.
    pub index: u32,
    /// Rows per page.
    pub size: u32,
}

impl Page {
    /// Rows per page when the client does not ask for a size.
    pub const DEFAULT_SIZE: u32 = 20;
    /// Largest page a client may request.
    pub const MAX_SIZE: u32 = 500;

    /// Build a page from client input, applying the default and the cap.
    pub fn new(index: Option<u32>, size: Option<u32>) -> Self {
        let size = match size {
            None | Some(0) => Self::DEFAULT_SIZE,
            Some(size) => size.min(Self::MAX_SIZE),
        };

        Self {
            index: index.unwrap_or(0),
            size,
        }
    }

    pub(crate) fn limit(&self) -> i64 {
        i64::from(self.size)
    }

    pub(crate) fn offset(&self) -> i64 {
        i64::from(self.index) * i64::from(self.size)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of a list query together with the total match count.
#[derive(Debug, Clone, Serialize)]
pub struct Paged<T> {
    /// Rows on this page.
    pub items: Vec<T>,
    /// Rows matching the filter across all pages.
    pub count: i64,
}

/// Change notification row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EventRecord {
    /// Monotonic id; agents poll for ids above the last one seen.
    pub id: i64,
    /// Topic name (`disk.change`, `instance.change`).
    pub topic: String,
    /// When the notification was recorded.
    pub created_at: DateTime<Utc>,
}

/// Persistence interface used by the lifecycle handlers.
///
/// Every method taking an `organization` applies it as a filter; rows of other
/// organizations are invisible to it.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Fetch a disk regardless of owner.
    ///
    /// Agent-side and administrative reads only. Request handlers use
    /// [`Persistence::get_disk_in_organization`] so other tenants' disks stay
    /// invisible.
    async fn get_disk(&self, id: Uuid) -> Result<Option<Disk>>;

    /// Fetch a disk owned by `organization`.
    async fn get_disk_in_organization(&self, organization: Uuid, id: Uuid) -> Result<Option<Disk>>;

    /// Insert a new disk with every field.
    async fn insert_disk(&self, disk: &Disk) -> Result<()>;

    /// Write the given fields of `disk`. Returns `false` if no row matched.
    async fn commit_disk(&self, disk: &Disk, fields: FieldSet<DiskField>) -> Result<bool>;

    /// Delete an unprotected disk. Returns `false` if nothing was deleted.
    async fn delete_disk(&self, organization: Uuid, id: Uuid) -> Result<bool>;

    /// Delete the unprotected disks among `ids`. Returns the number deleted.
    async fn delete_disks(&self, organization: Uuid, ids: &[Uuid]) -> Result<u64>;

    /// Set the state of the disks among `ids`. Returns the number updated.
    async fn update_disk_states(
        &self,
        organization: Uuid,
        ids: &[Uuid],
        state: DiskState,
    ) -> Result<u64>;

    /// List disks matching `filter`, ordered by name.
    async fn list_disks(
        &self,
        organization: Uuid,
        filter: &DiskFilter,
        page: Page,
    ) -> Result<Paged<Disk>>;

    /// Copy an instance's delete protection onto its attached disks.
    async fn set_instance_disks_delete_protection(
        &self,
        organization: Uuid,
        instance: Uuid,
        delete_protection: bool,
    ) -> Result<u64>;

    /// Fetch an instance regardless of owner.
    ///
    /// Agent-side and administrative reads only. Request handlers use
    /// [`Persistence::get_instance_in_organization`].
    async fn get_instance(&self, id: Uuid) -> Result<Option<Instance>>;

    /// Fetch an instance owned by `organization`.
    async fn get_instance_in_organization(
        &self,
        organization: Uuid,
        id: Uuid,
    ) -> Result<Option<Instance>>;

    /// Insert a new instance with every field.
    async fn insert_instance(&self, instance: &Instance) -> Result<()>;

    /// Write the given fields of `instance`. Returns `false` if no row matched.
    async fn commit_instance(
        &self,
        instance: &Instance,
        fields: FieldSet<InstanceField>,
    ) -> Result<bool>;

    /// Delete an unprotected instance. Returns `false` if nothing was deleted.
    async fn delete_instance(&self, organization: Uuid, id: Uuid) -> Result<bool>;

    /// Delete the unprotected instances among `ids`. Returns the number deleted.
    async fn delete_instances(&self, organization: Uuid, ids: &[Uuid]) -> Result<u64>;

    /// Set the state of the instances among `ids`, clearing the restart flags
    /// for any state other than `start`. Returns the number updated.
    async fn update_instance_states(
        &self,
        organization: Uuid,
        ids: &[Uuid],
        state: InstanceState,
    ) -> Result<u64>;

    /// List instances matching `filter`, ordered by name.
    async fn list_instances(
        &self,
        organization: Uuid,
        filter: &InstanceFilter,
        page: Page,
    ) -> Result<Paged<Instance>>;

    /// Ids and names of the organization's instances on `node`.
    async fn list_instance_names(&self, organization: Uuid, node: Uuid) -> Result<Vec<InstanceName>>;

    /// Record a change notification. Returns the event id.
    async fn insert_event(&self, topic: Topic) -> Result<i64>;

    /// Notifications with an id greater than `after`, oldest first.
    async fn list_events(&self, after: i64, limit: i64) -> Result<Vec<EventRecord>>;

    /// Whether the backing store answers queries.
    async fn health_check(&self) -> Result<bool>;
}
