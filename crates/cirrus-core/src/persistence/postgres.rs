// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL-backed store.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::directory::{Directory, Image, Node, Storage, Zone};
use crate::disk::{Disk, DiskField, DiskFilter, DiskState};
use crate::error::{ReferenceKind, Result};
use crate::events::Topic;
use crate::field_set::{Field, FieldSet};
use crate::instance::{Instance, InstanceField, InstanceFilter, InstanceName, InstanceState};

use super::{DISK_COLUMNS, EventRecord, INSTANCE_COLUMNS, Page, Paged, Persistence};

/// PostgreSQL-backed store, also serving the collaborator directory.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wrap an existing pool. Run [`crate::migrations::run_postgres`] first.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn push_disk_value(qb: &mut QueryBuilder<'_, Postgres>, disk: &Disk, field: DiskField) {
    match field {
        DiskField::Organization => qb.push_bind(disk.organization),
        DiskField::Node => qb.push_bind(disk.node),
        DiskField::Instance => qb.push_bind(disk.instance),
        DiskField::Name => qb.push_bind(disk.name.clone()),
        DiskField::Comment => qb.push_bind(disk.comment.clone()),
        DiskField::Index => qb.push_bind(disk.index.clone()),
        DiskField::Size => qb.push_bind(disk.size),
        DiskField::NewSize => qb.push_bind(disk.new_size),
        DiskField::DeleteProtection => qb.push_bind(disk.delete_protection),
        DiskField::Backup => qb.push_bind(disk.backup),
        DiskField::Backing => qb.push_bind(disk.backing),
        DiskField::State => qb.push_bind(disk.state.as_str()),
        DiskField::Image => qb.push_bind(disk.image),
        DiskField::RestoreImage => qb.push_bind(disk.restore_image),
    };
}

fn push_instance_value(qb: &mut QueryBuilder<'_, Postgres>, instance: &Instance, field: InstanceField) {
    match field {
        InstanceField::Organization => qb.push_bind(instance.organization),
        InstanceField::Zone => qb.push_bind(instance.zone),
        InstanceField::Node => qb.push_bind(instance.node),
        InstanceField::Vpc => qb.push_bind(instance.vpc),
        InstanceField::Domain => qb.push_bind(instance.domain),
        InstanceField::Name => qb.push_bind(instance.name.clone()),
        InstanceField::State => qb.push_bind(instance.state.as_str()),
        InstanceField::Memory => qb.push_bind(instance.memory),
        InstanceField::Processors => qb.push_bind(instance.processors),
        InstanceField::NetworkRoles => qb.push_bind(Json(instance.network_roles.clone())),
        InstanceField::Vnc => qb.push_bind(instance.vnc),
        InstanceField::VncPassword => qb.push_bind(instance.vnc_password.clone()),
        InstanceField::VncDisplay => qb.push_bind(instance.vnc_display),
        InstanceField::DeleteProtection => qb.push_bind(instance.delete_protection),
        InstanceField::NoPublicAddress => qb.push_bind(instance.no_public_address),
        InstanceField::NoHostAddress => qb.push_bind(instance.no_host_address),
        InstanceField::Image => qb.push_bind(instance.image),
        InstanceField::ImageBacking => qb.push_bind(instance.image_backing),
        InstanceField::InitDiskSize => qb.push_bind(instance.init_disk_size),
        InstanceField::Restart => qb.push_bind(instance.restart),
        InstanceField::RestartBlockIp => qb.push_bind(instance.restart_block_ip),
        InstanceField::VmState => qb.push_bind(instance.vm_state.clone()),
        InstanceField::PublicIps => qb.push_bind(Json(instance.public_ips.clone())),
        InstanceField::PublicIps6 => qb.push_bind(Json(instance.public_ips6.clone())),
        InstanceField::PrivateIps => qb.push_bind(Json(instance.private_ips.clone())),
        InstanceField::PrivateIps6 => qb.push_bind(Json(instance.private_ips6.clone())),
    };
}

/// `INSERT INTO table (id, <all columns>) VALUES (...)`.
fn build_insert<'args, F: Field>(
    table: &str,
    id: Uuid,
    mut push_value: impl FnMut(&mut QueryBuilder<'args, Postgres>, F),
) -> QueryBuilder<'args, Postgres> {
    let fields = FieldSet::<F>::all();

    let mut qb = QueryBuilder::new(format!("INSERT INTO {} (id", table));
    for column in fields.columns() {
        qb.push(", ").push(column);
    }
    qb.push(") VALUES (").push_bind(id);
    for field in fields.iter() {
        qb.push(", ");
        push_value(&mut qb, field);
    }
    qb.push(")");
    qb
}

/// `UPDATE table SET <fields> WHERE id = $n AND organization = $m`.
fn build_commit<'args, F: Field>(
    table: &str,
    id: Uuid,
    organization: Uuid,
    fields: FieldSet<F>,
    mut push_value: impl FnMut(&mut QueryBuilder<'args, Postgres>, F),
) -> QueryBuilder<'args, Postgres> {
    let mut qb = QueryBuilder::new(format!("UPDATE {} SET ", table));
    for (position, field) in fields.iter().enumerate() {
        if position > 0 {
            qb.push(", ");
        }
        qb.push(field.column()).push(" = ");
        push_value(&mut qb, field);
    }
    qb.push(" WHERE id = ")
        .push_bind(id)
        .push(" AND organization = ")
        .push_bind(organization);
    qb
}

fn push_id_list(qb: &mut QueryBuilder<'_, Postgres>, ids: &[Uuid]) {
    qb.push(" AND id IN (");
    let mut list = qb.separated(", ");
    for id in ids {
        list.push_bind(*id);
    }
    list.push_unseparated(")");
}

fn push_disk_filter(qb: &mut QueryBuilder<'_, Postgres>, organization: Uuid, filter: &DiskFilter) {
    qb.push(" WHERE organization = ").push_bind(organization);
    if let Some(id) = filter.id {
        qb.push(" AND id = ").push_bind(id);
    }
    if let Some(name) = filter.name.as_deref().filter(|name| !name.is_empty()) {
        qb.push(" AND strpos(lower(name), lower(")
            .push_bind(name.to_string())
            .push(")) > 0");
    }
    if let Some(instance) = filter.instance {
        qb.push(" AND instance = ").push_bind(instance);
    }
}

fn push_instance_filter(
    qb: &mut QueryBuilder<'_, Postgres>,
    organization: Uuid,
    filter: &InstanceFilter,
) {
    qb.push(" WHERE organization = ").push_bind(organization);
    if let Some(id) = filter.id {
        qb.push(" AND id = ").push_bind(id);
    }
    if let Some(name) = filter.name.as_deref().filter(|name| !name.is_empty()) {
        qb.push(" AND strpos(lower(name), lower(")
            .push_bind(name.to_string())
            .push(")) > 0");
    }
    if let Some(node) = filter.node {
        qb.push(" AND node = ").push_bind(node);
    }
    if let Some(zone) = filter.zone {
        qb.push(" AND zone = ").push_bind(zone);
    }
    if let Some(vpc) = filter.vpc {
        qb.push(" AND vpc = ").push_bind(vpc);
    }
    if let Some(role) = filter.network_role.as_deref().filter(|role| !role.is_empty()) {
        qb.push(" AND network_roles @> jsonb_build_array(")
            .push_bind(role.to_string())
            .push("::text)");
    }
}

#[async_trait]
impl Persistence for PostgresStore {
    async fn get_disk(&self, id: Uuid) -> Result<Option<Disk>> {
        let disk = sqlx::query_as::<_, Disk>(&format!(
            "SELECT {} FROM disks WHERE id = $1",
            DISK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(disk)
    }

    async fn get_disk_in_organization(&self, organization: Uuid, id: Uuid) -> Result<Option<Disk>> {
        let disk = sqlx::query_as::<_, Disk>(&format!(
            "SELECT {} FROM disks WHERE id = $1 AND organization = $2",
            DISK_COLUMNS
        ))
        .bind(id)
        .bind(organization)
        .fetch_optional(&self.pool)
        .await?;

        Ok(disk)
    }

    async fn insert_disk(&self, disk: &Disk) -> Result<()> {
        build_insert("disks", disk.id, |qb, field| push_disk_value(qb, disk, field))
            .build()
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn commit_disk(&self, disk: &Disk, fields: FieldSet<DiskField>) -> Result<bool> {
        if fields.is_empty() {
            return Ok(self
                .get_disk_in_organization(disk.organization, disk.id)
                .await?
                .is_some());
        }

        let result = build_commit("disks", disk.id, disk.organization, fields, |qb, field| {
            push_disk_value(qb, disk, field)
        })
        .build()
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_disk(&self, organization: Uuid, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM disks WHERE id = $1 AND organization = $2 AND NOT delete_protection",
        )
        .bind(id)
        .bind(organization)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_disks(&self, organization: Uuid, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM disks WHERE organization = ");
        qb.push_bind(organization).push(" AND NOT delete_protection");
        push_id_list(&mut qb, ids);

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn update_disk_states(
        &self,
        organization: Uuid,
        ids: &[Uuid],
        state: DiskState,
    ) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE disks SET state = ");
        qb.push_bind(state.as_str())
            .push(" WHERE organization = ")
            .push_bind(organization);
        push_id_list(&mut qb, ids);

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn list_disks(
        &self,
        organization: Uuid,
        filter: &DiskFilter,
        page: Page,
    ) -> Result<Paged<Disk>> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM disks");
        push_disk_filter(&mut count_query, organization, filter);
        let count = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut query = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM disks", DISK_COLUMNS));
        push_disk_filter(&mut query, organization, filter);
        query
            .push(" ORDER BY name, id LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let items = query.build_query_as::<Disk>().fetch_all(&self.pool).await?;

        Ok(Paged { items, count })
    }

    async fn set_instance_disks_delete_protection(
        &self,
        organization: Uuid,
        instance: Uuid,
        delete_protection: bool,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE disks SET delete_protection = $1 WHERE organization = $2 AND instance = $3",
        )
        .bind(delete_protection)
        .bind(organization)
        .bind(instance)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn get_instance(&self, id: Uuid) -> Result<Option<Instance>> {
        let instance = sqlx::query_as::<_, Instance>(&format!(
            "SELECT {} FROM instances WHERE id = $1",
            INSTANCE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(instance)
    }

    async fn get_instance_in_organization(
        &self,
        organization: Uuid,
        id: Uuid,
    ) -> Result<Option<Instance>> {
        let instance = sqlx::query_as::<_, Instance>(&format!(
            "SELECT {} FROM instances WHERE id = $1 AND organization = $2",
            INSTANCE_COLUMNS
        ))
        .bind(id)
        .bind(organization)
        .fetch_optional(&self.pool)
        .await?;

        Ok(instance)
    }

    async fn insert_instance(&self, instance: &Instance) -> Result<()> {
        build_insert("instances", instance.id, |qb, field| {
            push_instance_value(qb, instance, field)
        })
        .build()
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn commit_instance(
        &self,
        instance: &Instance,
        fields: FieldSet<InstanceField>,
    ) -> Result<bool> {
        if fields.is_empty() {
            return Ok(self
                .get_instance_in_organization(instance.organization, instance.id)
                .await?
                .is_some());
        }

        let result = build_commit(
            "instances",
            instance.id,
            instance.organization,
            fields,
            |qb, field| push_instance_value(qb, instance, field),
        )
        .build()
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_instance(&self, organization: Uuid, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM instances WHERE id = $1 AND organization = $2 AND NOT delete_protection",
        )
        .bind(id)
        .bind(organization)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_instances(&self, organization: Uuid, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM instances WHERE organization = ");
        qb.push_bind(organization).push(" AND NOT delete_protection");
        push_id_list(&mut qb, ids);

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn update_instance_states(
        &self,
        organization: Uuid,
        ids: &[Uuid],
        state: InstanceState,
    ) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE instances SET state = ");
        qb.push_bind(state.as_str());
        if state != InstanceState::Start {
            qb.push(", restart = ")
                .push_bind(false)
                .push(", restart_block_ip = ")
                .push_bind(false);
        }
        qb.push(" WHERE organization = ").push_bind(organization);
        push_id_list(&mut qb, ids);

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn list_instances(
        &self,
        organization: Uuid,
        filter: &InstanceFilter,
        page: Page,
    ) -> Result<Paged<Instance>> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM instances");
        push_instance_filter(&mut count_query, organization, filter);
        let count = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut query =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM instances", INSTANCE_COLUMNS));
        push_instance_filter(&mut query, organization, filter);
        query
            .push(" ORDER BY name, id LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let items = query
            .build_query_as::<Instance>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Paged { items, count })
    }

    async fn list_instance_names(&self, organization: Uuid, node: Uuid) -> Result<Vec<InstanceName>> {
        let names = sqlx::query_as::<_, InstanceName>(
            "SELECT id, name FROM instances WHERE organization = $1 AND node = $2 ORDER BY name, id",
        )
        .bind(organization)
        .bind(node)
        .fetch_all(&self.pool)
        .await?;

        Ok(names)
    }

    async fn insert_event(&self, topic: Topic) -> Result<i64> {
        let id: i64 = sqlx::query_scalar("INSERT INTO events (topic) VALUES ($1) RETURNING id")
            .bind(topic.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(id)
    }

    async fn list_events(&self, after: i64, limit: i64) -> Result<Vec<EventRecord>> {
        let events = sqlx::query_as::<_, EventRecord>(
            "SELECT id, topic, created_at FROM events WHERE id > $1 ORDER BY id LIMIT $2",
        )
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    async fn health_check(&self) -> Result<bool> {
        let result: std::result::Result<i32, sqlx::Error> =
            sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await;
        Ok(result.is_ok())
    }
}

#[async_trait]
impl Directory for PostgresStore {
    async fn exists_in_organization(
        &self,
        kind: ReferenceKind,
        organization: Uuid,
        id: Uuid,
    ) -> Result<bool> {
        let sql = match kind {
            ReferenceKind::Datacenter => {
                "SELECT EXISTS(SELECT 1 FROM datacenters \
                 WHERE id = $1 AND (organization = $2 OR organization IS NULL))"
            }
            ReferenceKind::Zone => {
                "SELECT EXISTS(SELECT 1 FROM zones z JOIN datacenters d ON d.id = z.datacenter \
                 WHERE z.id = $1 AND (d.organization = $2 OR d.organization IS NULL))"
            }
            ReferenceKind::Node => {
                "SELECT EXISTS(SELECT 1 FROM nodes n JOIN zones z ON z.id = n.zone \
                 JOIN datacenters d ON d.id = z.datacenter \
                 WHERE n.id = $1 AND (d.organization = $2 OR d.organization IS NULL))"
            }
            ReferenceKind::Vpc => {
                "SELECT EXISTS(SELECT 1 FROM vpcs WHERE id = $1 AND organization = $2)"
            }
            ReferenceKind::Domain => {
                "SELECT EXISTS(SELECT 1 FROM domains WHERE id = $1 AND organization = $2)"
            }
            ReferenceKind::Image => {
                "SELECT EXISTS(SELECT 1 FROM images \
                 WHERE id = $1 AND (organization = $2 OR organization IS NULL))"
            }
            ReferenceKind::Instance => {
                "SELECT EXISTS(SELECT 1 FROM instances WHERE id = $1 AND organization = $2)"
            }
            ReferenceKind::Storage => {
                let exists: bool =
                    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM storages WHERE id = $1)")
                        .bind(id)
                        .fetch_one(&self.pool)
                        .await?;
                return Ok(exists);
            }
        };

        let exists: bool = sqlx::query_scalar(sql)
            .bind(id)
            .bind(organization)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }

    async fn get_zone(&self, id: Uuid) -> Result<Option<Zone>> {
        let zone = sqlx::query_as::<_, Zone>("SELECT id, datacenter, name FROM zones WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(zone)
    }

    async fn get_node(&self, id: Uuid) -> Result<Option<Node>> {
        let node = sqlx::query_as::<_, Node>("SELECT id, zone, name FROM nodes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(node)
    }

    async fn get_image(&self, id: Uuid) -> Result<Option<Image>> {
        let image = sqlx::query_as::<_, Image>(
            "SELECT id, organization, name, storage, storage_class, disk FROM images WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(image)
    }

    async fn get_storage(&self, id: Uuid) -> Result<Option<Storage>> {
        let storage =
            sqlx::query_as::<_, Storage>("SELECT id, name, kind FROM storages WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(storage)
    }
}
