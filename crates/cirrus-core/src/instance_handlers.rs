// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance lifecycle handlers.
//!
//! Creation may produce a batch of instances from one name template. Updates
//! replace the simple attributes wholesale and overwrite the state only when
//! one is supplied. A change of delete protection is copied onto the
//! instance's attached disks.

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{ControlError, ReferenceKind, ResourceKind, Result};
use crate::events::Topic;
use crate::field_set::FieldSet;
use crate::instance::{
    INSTANCE_UPDATE_FIELDS, Instance, InstanceField, InstanceFilter, InstanceName,
    InstanceRequest, InstanceState, MAX_INSTANCE_COUNT,
};
use crate::naming::format_instance_name;
use crate::persistence::{Page, Paged};
use crate::state::{BulkStateRequest, RequestContext};

fn not_found(id: Uuid) -> ControlError {
    ControlError::NotFound {
        kind: ResourceKind::Instance,
        id,
    }
}

/// A single created instance, or the ordered batch.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    /// Exactly one item was requested.
    One(T),
    /// A batch was requested.
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// Flatten into a list.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

/// Fetch one instance of the organization.
pub async fn handle_get_instance(ctx: &RequestContext<'_>, id: Uuid) -> Result<Instance> {
    ctx.store()
        .get_instance_in_organization(ctx.organization(), id)
        .await?
        .ok_or_else(|| not_found(id))
}

/// List the organization's instances.
pub async fn handle_list_instances(
    ctx: &RequestContext<'_>,
    filter: &InstanceFilter,
    page: Page,
) -> Result<Paged<Instance>> {
    ctx.store()
        .list_instances(ctx.organization(), filter, page)
        .await
}

/// Ids and names of the organization's instances on one node.
pub async fn handle_list_instance_names(
    ctx: &RequestContext<'_>,
    node: Uuid,
) -> Result<Vec<InstanceName>> {
    ctx.store()
        .list_instance_names(ctx.organization(), node)
        .await
}

/// Create one or more instances from a request.
///
/// Instances are inserted one by one. The first failure stops the batch and is
/// returned; instances inserted before it stay.
#[instrument(skip(ctx, request), fields(organization = %ctx.organization(), count = request.count))]
pub async fn handle_create_instances(
    ctx: &RequestContext<'_>,
    request: InstanceRequest,
) -> Result<OneOrMany<Instance>> {
    let count = match request.count {
        0 => 1,
        count if count > MAX_INSTANCE_COUNT => {
            return Err(ControlError::validation(
                "instance_count_invalid",
                format!("At most {} instances can be created at once", MAX_INSTANCE_COUNT),
            ));
        }
        count => count,
    };

    // 1. Placement: zone -> datacenter, node inside the zone
    let references = ctx.references();
    let (zone, node) = references
        .zone_placement(request.zone, request.node)
        .await?;

    // 2. Network
    let vpc = references.require(ReferenceKind::Vpc, request.vpc).await?;
    references
        .check(ReferenceKind::Domain, request.domain)
        .await?;

    // 3. Boot image
    let image_id = request
        .image
        .ok_or_else(|| ControlError::validation("image_not_found", "Image not found"))?;
    let image = references.available_image(image_id).await?;

    let mut created = Vec::with_capacity(count as usize);
    let mut failure = None;

    for index in 1..=count {
        let mut instance = Instance {
            id: Uuid::new_v4(),
            organization: ctx.organization(),
            zone: zone.id,
            node: node.id,
            vpc,
            domain: request.domain,
            name: format_instance_name(&request.name, index as usize),
            state: request.state.unwrap_or_default(),
            memory: request.memory,
            processors: request.processors,
            network_roles: request.network_roles.clone(),
            vnc: request.vnc,
            vnc_password: String::new(),
            vnc_display: 0,
            delete_protection: request.delete_protection,
            no_public_address: request.no_public_address,
            no_host_address: request.no_host_address,
            image: Some(image.id),
            image_backing: request.image_backing,
            init_disk_size: request.init_disk_size,
            restart: false,
            restart_block_ip: false,
            vm_state: String::new(),
            public_ips: Vec::new(),
            public_ips6: Vec::new(),
            private_ips: Vec::new(),
            private_ips6: Vec::new(),
        };

        let inserted = match instance.validate() {
            Ok(()) => ctx.store().insert_instance(&instance).await,
            Err(e) => Err(e),
        };

        match inserted {
            Ok(()) => {
                info!(instance_id = %instance.id, name = %instance.name, "Instance created");
                created.push(instance);
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    if !created.is_empty() {
        ctx.notify(Topic::InstanceChange).await;
    }

    if let Some(e) = failure {
        warn!(
            created = created.len(),
            requested = count,
            error = %e,
            "Instance batch stopped"
        );
        return Err(e);
    }

    if count == 1
        && let Some(instance) = created.pop()
    {
        return Ok(OneOrMany::One(instance));
    }
    Ok(OneOrMany::Many(created))
}

/// Apply an update to an instance.
#[instrument(skip(ctx, request), fields(organization = %ctx.organization(), instance_id = %id))]
pub async fn handle_update_instance(
    ctx: &RequestContext<'_>,
    id: Uuid,
    request: InstanceRequest,
) -> Result<Instance> {
    let mut instance = handle_get_instance(ctx, id).await?;

    let references = ctx.references();
    let vpc = references.require(ReferenceKind::Vpc, request.vpc).await?;
    references
        .check(ReferenceKind::Domain, request.domain)
        .await?;

    let previous_protection = instance.delete_protection;

    let mut fields = FieldSet::of(INSTANCE_UPDATE_FIELDS);
    instance.vpc = vpc;
    instance.domain = request.domain;
    instance.name = request.name;
    instance.memory = request.memory;
    instance.processors = request.processors;
    instance.network_roles = request.network_roles;
    instance.vnc = request.vnc;
    instance.delete_protection = request.delete_protection;
    instance.no_public_address = request.no_public_address;
    instance.no_host_address = request.no_host_address;

    // Restart flags belong to whoever requested the restart; they are only
    // written when leaving `start` clears them.
    if let Some(state) = request.state {
        instance.state = state;
        fields.insert(InstanceField::State);
        if state != InstanceState::Start {
            fields.insert(InstanceField::Restart);
            fields.insert(InstanceField::RestartBlockIp);
        }
    }

    instance.validate()?;

    let disks_changed = sync_attached_disks(ctx, &instance, previous_protection).await?;

    if !ctx.store().commit_instance(&instance, fields).await? {
        return Err(not_found(id));
    }

    info!(state = %instance.state, disks_changed, "Instance updated");
    ctx.notify(Topic::InstanceChange).await;
    if disks_changed {
        ctx.notify(Topic::DiskChange).await;
    }

    Ok(instance)
}

/// Copy a changed delete protection onto the instance's disks.
///
/// Returns whether any disk was written.
async fn sync_attached_disks(
    ctx: &RequestContext<'_>,
    instance: &Instance,
    previous_protection: bool,
) -> Result<bool> {
    if instance.delete_protection == previous_protection {
        return Ok(false);
    }

    let updated = ctx
        .store()
        .set_instance_disks_delete_protection(
            ctx.organization(),
            instance.id,
            instance.delete_protection,
        )
        .await?;

    debug!(
        delete_protection = instance.delete_protection,
        disks = updated,
        "Delete protection copied to attached disks"
    );
    Ok(updated > 0)
}

/// Set one state on many instances. Only `start`, `stop` and `restart` are
/// accepted; anything but `start` also clears the restart flags.
#[instrument(skip(ctx, request), fields(organization = %ctx.organization()))]
pub async fn handle_update_instance_states(
    ctx: &RequestContext<'_>,
    request: BulkStateRequest<InstanceState>,
) -> Result<u64> {
    let state = request
        .state
        .filter(InstanceState::is_bulk_allowed)
        .ok_or_else(|| ControlError::validation("invalid_state", "Invalid instance state"))?;

    let updated = ctx
        .store()
        .update_instance_states(ctx.organization(), &request.ids, state)
        .await?;

    info!(
        state = %state,
        requested = request.ids.len(),
        updated,
        "Instance states updated"
    );
    ctx.notify(Topic::InstanceChange).await;

    Ok(updated)
}

/// Delete an instance. Deleting an absent instance succeeds.
#[instrument(skip(ctx), fields(organization = %ctx.organization(), instance_id = %id))]
pub async fn handle_delete_instance(ctx: &RequestContext<'_>, id: Uuid) -> Result<()> {
    if ctx.store().delete_instance(ctx.organization(), id).await? {
        info!("Instance deleted");
    } else if ctx
        .store()
        .get_instance_in_organization(ctx.organization(), id)
        .await?
        .is_some()
    {
        return Err(ControlError::validation(
            "delete_protection",
            "Cannot delete instance with delete protection",
        ));
    } else {
        debug!("Instance already absent");
    }

    ctx.notify(Topic::InstanceChange).await;
    Ok(())
}

/// Delete many instances, skipping protected ones.
#[instrument(skip(ctx, ids), fields(organization = %ctx.organization(), requested = ids.len()))]
pub async fn handle_delete_instances(ctx: &RequestContext<'_>, ids: &[Uuid]) -> Result<u64> {
    let deleted = ctx
        .store()
        .delete_instances(ctx.organization(), ids)
        .await?;

    info!(deleted, "Instances deleted");
    ctx.notify(Topic::InstanceChange).await;

    Ok(deleted)
}
