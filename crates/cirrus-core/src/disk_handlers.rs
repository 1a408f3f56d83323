// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Disk lifecycle handlers.
//!
//! Each mutating handler follows the same sequence: check foreign references,
//! apply the request to the loaded disk, validate, persist exactly the fields
//! the request may change, then publish `disk.change`.

use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::disk::{
    DISK_UPDATE_FIELDS, Disk, DiskField, DiskFilter, DiskRequest, DiskState, DiskTransition,
    disk_transition,
};
use crate::error::{ControlError, ReferenceKind, ResourceKind, Result};
use crate::events::Topic;
use crate::field_set::FieldSet;
use crate::persistence::{Page, Paged};
use crate::state::{BulkStateRequest, RequestContext};

fn not_found(id: Uuid) -> ControlError {
    ControlError::NotFound {
        kind: ResourceKind::Disk,
        id,
    }
}

/// Fetch one disk of the organization.
pub async fn handle_get_disk(ctx: &RequestContext<'_>, id: Uuid) -> Result<Disk> {
    ctx.store()
        .get_disk_in_organization(ctx.organization(), id)
        .await?
        .ok_or_else(|| not_found(id))
}

/// List the organization's disks.
pub async fn handle_list_disks(
    ctx: &RequestContext<'_>,
    filter: &DiskFilter,
    page: Page,
) -> Result<Paged<Disk>> {
    ctx.store()
        .list_disks(ctx.organization(), filter, page)
        .await
}

/// Create a disk in the `available` state.
#[instrument(skip(ctx, request), fields(organization = %ctx.organization()))]
pub async fn handle_create_disk(ctx: &RequestContext<'_>, request: DiskRequest) -> Result<Disk> {
    let references = ctx.references();

    // 1. Placement: node -> zone -> datacenter
    let node = references.node_placement(request.node).await?;

    // 2. Optional attachment and source image
    references
        .check(ReferenceKind::Instance, request.instance)
        .await?;
    let image = match request.image {
        Some(id) => Some(references.available_image(id).await?.id),
        None => None,
    };

    let mut disk = Disk {
        id: Uuid::new_v4(),
        organization: ctx.organization(),
        node: node.id,
        instance: request.instance,
        name: request.name,
        comment: request.comment,
        index: request.index,
        size: request.size,
        new_size: None,
        delete_protection: request.delete_protection,
        backup: request.backup,
        backing: request.backing,
        state: DiskState::Available,
        image,
        restore_image: None,
    };
    disk.validate()?;

    ctx.store().insert_disk(&disk).await?;

    info!(
        disk_id = %disk.id,
        node_id = %disk.node,
        size = disk.size,
        "Disk created"
    );
    ctx.notify(Topic::DiskChange).await;

    Ok(disk)
}

/// Apply an update to a disk, including any requested state transition.
#[instrument(skip(ctx, request), fields(organization = %ctx.organization(), disk_id = %id))]
pub async fn handle_update_disk(
    ctx: &RequestContext<'_>,
    id: Uuid,
    request: DiskRequest,
) -> Result<Disk> {
    let mut disk = handle_get_disk(ctx, id).await?;

    ctx.references()
        .check(ReferenceKind::Instance, request.instance)
        .await?;

    let mut fields = FieldSet::of(DISK_UPDATE_FIELDS);
    disk.name = request.name;
    disk.comment = request.comment;
    disk.instance = request.instance;
    disk.index = request.index;
    disk.delete_protection = request.delete_protection;
    disk.backup = request.backup;

    if let Some(requested) = request.state {
        match disk_transition(disk.state, requested) {
            Some(DiskTransition::Enter(state)) => {
                disk.state = state;
                fields.insert(DiskField::State);
            }
            Some(DiskTransition::Expand) => {
                let new_size = request.new_size.filter(|size| *size != 0).ok_or_else(|| {
                    ControlError::validation("disk_new_size_required", "New disk size required")
                })?;
                if new_size <= disk.size {
                    return Err(ControlError::validation(
                        "disk_new_size_invalid",
                        "New disk size must be larger than the current size",
                    ));
                }
                disk.state = DiskState::Expand;
                disk.new_size = Some(new_size);
                fields.extend([DiskField::State, DiskField::NewSize]);
            }
            Some(DiskTransition::Restore) => {
                let image_id = request.restore_image.ok_or_else(|| {
                    ControlError::validation("restore_image_required", "Restore image required")
                })?;
                let image = ctx
                    .directory()
                    .get_image(image_id)
                    .await?
                    .ok_or(ControlError::NotFound {
                        kind: ResourceKind::Image,
                        id: image_id,
                    })?;
                if image.disk != Some(disk.id) {
                    return Err(ControlError::validation(
                        "invalid_restore_image",
                        "Invalid restore image",
                    ));
                }
                disk.state = DiskState::Restore;
                disk.restore_image = Some(image.id);
                fields.extend([DiskField::State, DiskField::RestoreImage]);
            }
            Some(DiskTransition::RejectRestoreActive) => {
                return Err(ControlError::validation(
                    "disk_restore_active",
                    "Disk restore already active",
                ));
            }
            None => {
                debug!(
                    current = %disk.state,
                    requested = %requested,
                    "State change ignored"
                );
            }
        }
    }

    disk.validate()?;

    if !ctx.store().commit_disk(&disk, fields).await? {
        return Err(not_found(id));
    }

    info!(state = %disk.state, fields = ?fields, "Disk updated");
    ctx.notify(Topic::DiskChange).await;

    Ok(disk)
}

/// Set one state on many disks. Only `snapshot` and `backup` are accepted.
#[instrument(skip(ctx, request), fields(organization = %ctx.organization()))]
pub async fn handle_update_disk_states(
    ctx: &RequestContext<'_>,
    request: BulkStateRequest<DiskState>,
) -> Result<u64> {
    let state = request
        .state
        .filter(DiskState::is_bulk_allowed)
        .ok_or_else(|| ControlError::validation("invalid_state", "Invalid disk state"))?;

    let updated = ctx
        .store()
        .update_disk_states(ctx.organization(), &request.ids, state)
        .await?;

    info!(
        state = %state,
        requested = request.ids.len(),
        updated,
        "Disk states updated"
    );
    ctx.notify(Topic::DiskChange).await;

    Ok(updated)
}

/// Delete a disk. Deleting an absent disk succeeds.
#[instrument(skip(ctx), fields(organization = %ctx.organization(), disk_id = %id))]
pub async fn handle_delete_disk(ctx: &RequestContext<'_>, id: Uuid) -> Result<()> {
    if ctx.store().delete_disk(ctx.organization(), id).await? {
        info!("Disk deleted");
    } else if ctx
        .store()
        .get_disk_in_organization(ctx.organization(), id)
        .await?
        .is_some()
    {
        // The store only leaves a visible row behind when it is protected.
        return Err(ControlError::validation(
            "delete_protection",
            "Cannot delete disk with delete protection",
        ));
    } else {
        debug!("Disk already absent");
    }

    ctx.notify(Topic::DiskChange).await;
    Ok(())
}

/// Delete many disks, skipping protected ones.
#[instrument(skip(ctx, ids), fields(organization = %ctx.organization(), requested = ids.len()))]
pub async fn handle_delete_disks(ctx: &RequestContext<'_>, ids: &[Uuid]) -> Result<u64> {
    let deleted = ctx.store().delete_disks(ctx.organization(), ids).await?;

    info!(deleted, "Disks deleted");
    ctx.notify(Topic::DiskChange).await;

    Ok(deleted)
}
