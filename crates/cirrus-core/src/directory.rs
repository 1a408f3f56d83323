// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Read-only view of the records other subsystems own.
//!
//! Disks and instances reference datacenters, zones, nodes, VPCs, domains and
//! images. Those records are written elsewhere; the lifecycle controllers only
//! need to look them up and check who owns them.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ReferenceKind, Result};

/// Availability zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Zone {
    /// Zone id.
    pub id: Uuid,
    /// Owning datacenter.
    pub datacenter: Uuid,
    /// Display name.
    pub name: String,
}

/// Hypervisor node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Node {
    /// Node id.
    pub id: Uuid,
    /// Owning zone.
    pub zone: Uuid,
    /// Display name.
    pub name: String,
}

/// Provider behind an image storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// S3-compatible object storage.
    Aws,
    /// Oracle object storage.
    Oracle,
    /// Anything else.
    #[default]
    Other,
}

impl StorageKind {
    /// Stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Aws => "aws",
            StorageKind::Oracle => "oracle",
            StorageKind::Other => "other",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "aws" => StorageKind::Aws,
            "oracle" => StorageKind::Oracle,
            _ => StorageKind::Other,
        })
    }
}

impl From<String> for StorageKind {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }
}

/// Image storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Storage {
    /// Storage id.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Provider.
    #[sqlx(try_from = "String")]
    pub kind: StorageKind,
}

/// Disk image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Image {
    /// Image id.
    pub id: Uuid,
    /// Owning organization, `None` for public images.
    pub organization: Option<Uuid>,
    /// Display name.
    pub name: String,
    /// Storage holding the image data.
    pub storage: Uuid,
    /// Provider storage class (e.g. `STANDARD`, `GLACIER`).
    pub storage_class: String,
    /// Disk this image was taken from, if it is a backup.
    pub disk: Option<Uuid>,
}

impl Image {
    /// Whether the organization may use this image.
    pub fn is_visible_to(&self, organization: Uuid) -> bool {
        self.organization.is_none_or(|owner| owner == organization)
    }
}

/// Lookups against records owned by other subsystems.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Whether `id` names an entity of `kind` the organization may reference.
    ///
    /// Datacenters and images without an owner are visible to everyone; all
    /// other kinds must belong to the organization.
    async fn exists_in_organization(
        &self,
        kind: ReferenceKind,
        organization: Uuid,
        id: Uuid,
    ) -> Result<bool>;

    /// Fetch a zone by id.
    async fn get_zone(&self, id: Uuid) -> Result<Option<Zone>>;

    /// Fetch a node by id.
    async fn get_node(&self, id: Uuid) -> Result<Option<Node>>;

    /// Fetch an image by id, regardless of owner.
    async fn get_image(&self, id: Uuid) -> Result<Option<Image>>;

    /// Fetch a storage by id.
    async fn get_storage(&self, id: Uuid) -> Result<Option<Storage>>;
}
