// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Disk entity, its state machine and validation rules.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ControlError, Result};
use crate::field_set::entity_fields;
use crate::naming::filter_name;
use crate::serde_ext;

/// Smallest disk size in GiB.
pub const MIN_DISK_SIZE: i32 = 1;

/// Highest attachment slot on an instance.
pub const MAX_DISK_INDEX: u8 = 15;

/// Name given to disks created without one.
pub const DEFAULT_DISK_NAME: &str = "New Disk";

/// Error returned when a state string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} state '{value}'")]
pub struct ParseStateError {
    pub(crate) kind: &'static str,
    pub(crate) value: String,
}

/// Disk lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskState {
    /// Resting state; the agent returns disks here when work completes.
    #[default]
    Available,
    /// Snapshot in progress.
    Snapshot,
    /// Backup in progress.
    Backup,
    /// Growing to `new_size`.
    Expand,
    /// Restoring from `restore_image`.
    Restore,
}

impl DiskState {
    /// Stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiskState::Available => "available",
            DiskState::Snapshot => "snapshot",
            DiskState::Backup => "backup",
            DiskState::Expand => "expand",
            DiskState::Restore => "restore",
        }
    }

    /// Whether the state may be requested through a bulk update.
    pub fn is_bulk_allowed(&self) -> bool {
        matches!(self, DiskState::Snapshot | DiskState::Backup)
    }
}

impl fmt::Display for DiskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiskState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "available" => Ok(DiskState::Available),
            "snapshot" => Ok(DiskState::Snapshot),
            "backup" => Ok(DiskState::Backup),
            "expand" => Ok(DiskState::Expand),
            "restore" => Ok(DiskState::Restore),
            _ => Err(ParseStateError {
                kind: "disk",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for DiskState {
    type Error = ParseStateError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

/// Effect of requesting a state change on a disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskTransition {
    /// Move to the given state with no further requirements.
    Enter(DiskState),
    /// Move to `expand`; the request must carry a larger `new_size`.
    Expand,
    /// Move to `restore`; the request must carry a matching `restore_image`.
    Restore,
    /// A restore was requested while the disk is idle.
    RejectRestoreActive,
}

/// Transition table for disk state changes.
///
/// Returns `None` when the request is a no-op: the state is left untouched
/// and not written.
pub fn disk_transition(current: DiskState, requested: DiskState) -> Option<DiskTransition> {
    use DiskState::*;

    match (current, requested) {
        (Available, Snapshot) => Some(DiskTransition::Enter(Snapshot)),
        (Available, Backup) => Some(DiskTransition::Enter(Backup)),
        (Available, Expand) => Some(DiskTransition::Expand),
        (Available, Restore) => Some(DiskTransition::RejectRestoreActive),
        (_, Restore) => Some(DiskTransition::Restore),
        _ => None,
    }
}

entity_fields! {
    /// Persisted disk attributes.
    pub enum DiskField {
        /// Owning organization.
        Organization => "organization",
        /// Hypervisor node.
        Node => "node",
        /// Attached instance.
        Instance => "instance",
        /// Display name.
        Name => "name",
        /// Free-form comment.
        Comment => "comment",
        /// Attachment slot.
        Index => "disk_index",
        /// Size in GiB.
        Size => "size",
        /// Pending expansion target.
        NewSize => "new_size",
        /// Delete protection flag.
        DeleteProtection => "delete_protection",
        /// Backup flag.
        Backup => "backup",
        /// Backing flag.
        Backing => "backing",
        /// Lifecycle state.
        State => "state",
        /// Source image.
        Image => "image",
        /// Image being restored.
        RestoreImage => "restore_image",
    }
}

/// Fields an ordinary update may write. Conditional transitions add
/// `state`, `new_size` and `restore_image` on top.
pub const DISK_UPDATE_FIELDS: &[DiskField] = &[
    DiskField::Name,
    DiskField::Comment,
    DiskField::Instance,
    DiskField::DeleteProtection,
    DiskField::Index,
    DiskField::Backup,
];

/// A virtual block device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Disk {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning organization.
    pub organization: Uuid,
    /// Hypervisor node hosting the disk.
    pub node: Uuid,
    /// Instance the disk is attached to.
    pub instance: Option<Uuid>,
    /// Display name.
    pub name: String,
    /// Free-form comment.
    pub comment: String,
    /// Attachment slot, empty when detached.
    #[sqlx(rename = "disk_index")]
    pub index: String,
    /// Size in GiB.
    pub size: i32,
    /// Pending expansion target in GiB.
    pub new_size: Option<i32>,
    /// Prevents deletion while set.
    pub delete_protection: bool,
    /// Include in scheduled backups.
    pub backup: bool,
    /// Use the source image as a backing file.
    pub backing: bool,
    /// Lifecycle state.
    #[sqlx(try_from = "String")]
    pub state: DiskState,
    /// Source image.
    pub image: Option<Uuid>,
    /// Image being restored, set only while restoring.
    pub restore_image: Option<Uuid>,
}

impl Disk {
    /// Normalize and check the disk before it is persisted.
    pub fn validate(&mut self) -> Result<()> {
        self.name = filter_name(&self.name);
        if self.name.is_empty() {
            self.name = DEFAULT_DISK_NAME.to_string();
        }

        if self.size < MIN_DISK_SIZE {
            return Err(ControlError::validation(
                "disk_size_invalid",
                format!("Disk size must be at least {} GiB", MIN_DISK_SIZE),
            ));
        }

        if self.instance.is_none() {
            self.index.clear();
            return Ok(());
        }

        match self.index.trim().parse::<u8>() {
            Ok(slot) if slot <= MAX_DISK_INDEX => {
                self.index = slot.to_string();
                Ok(())
            }
            _ => Err(ControlError::validation(
                "disk_index_invalid",
                format!("Disk index must be between 0 and {}", MAX_DISK_INDEX),
            )),
        }
    }
}

/// Disk payload accepted by create and update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskRequest {
    /// Display name.
    pub name: String,
    /// Free-form comment.
    pub comment: String,
    /// Hypervisor node (create only).
    #[serde(deserialize_with = "serde_ext::reference")]
    pub node: Option<Uuid>,
    /// Instance to attach to.
    #[serde(deserialize_with = "serde_ext::reference")]
    pub instance: Option<Uuid>,
    /// Attachment slot.
    pub index: String,
    /// Size in GiB (create only).
    pub size: i32,
    /// Expansion target, required when requesting `expand`.
    pub new_size: Option<i32>,
    /// Delete protection flag.
    pub delete_protection: bool,
    /// Backup flag.
    pub backup: bool,
    /// Backing flag (create only).
    pub backing: bool,
    /// Requested state; absent or empty leaves the state alone.
    #[serde(deserialize_with = "serde_ext::optional_enum")]
    pub state: Option<DiskState>,
    /// Source image (create only).
    #[serde(deserialize_with = "serde_ext::reference")]
    pub image: Option<Uuid>,
    /// Image to restore from, required when requesting `restore`.
    #[serde(deserialize_with = "serde_ext::reference")]
    pub restore_image: Option<Uuid>,
}

/// Filters for listing disks.
#[derive(Debug, Clone, Default)]
pub struct DiskFilter {
    /// Exact id.
    pub id: Option<Uuid>,
    /// Case-insensitive name substring.
    pub name: Option<String>,
    /// Attached instance.
    pub instance: Option<Uuid>,
}
