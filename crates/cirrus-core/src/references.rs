// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Existence and ownership checks for foreign references.

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::directory::{Directory, Image, Node, Storage, StorageKind, Zone};
use crate::error::{ControlError, ReferenceKind, Result};

/// Storage classes whose objects must be restored before use.
pub const ARCHIVAL_STORAGE_CLASSES: &[&str] = &["GLACIER", "DEEP_ARCHIVE", "ARCHIVE"];

/// Decides whether an image's data can be read right now.
#[async_trait]
pub trait ImageAvailability: Send + Sync {
    /// Whether `image` stored in `storage` is readable.
    async fn is_available(&self, storage: &Storage, image: &Image) -> Result<bool>;
}

/// Treats images in archival storage classes as unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageClassAvailability;

#[async_trait]
impl ImageAvailability for StorageClassAvailability {
    async fn is_available(&self, _storage: &Storage, image: &Image) -> Result<bool> {
        let archived = ARCHIVAL_STORAGE_CLASSES
            .iter()
            .any(|class| class.eq_ignore_ascii_case(image.storage_class.trim()));
        Ok(!archived)
    }
}

/// Validates the references of a request on behalf of one organization.
pub struct ReferenceValidator<'a> {
    organization: Uuid,
    directory: &'a dyn Directory,
    availability: &'a dyn ImageAvailability,
}

impl<'a> ReferenceValidator<'a> {
    /// Create a validator scoped to `organization`.
    pub fn new(
        organization: Uuid,
        directory: &'a dyn Directory,
        availability: &'a dyn ImageAvailability,
    ) -> Self {
        Self {
            organization,
            directory,
            availability,
        }
    }

    /// Check an optional reference. An absent reference is accepted.
    pub async fn check(&self, kind: ReferenceKind, id: Option<Uuid>) -> Result<()> {
        match id {
            Some(id) => self.require(kind, Some(id)).await.map(|_| ()),
            None => Ok(()),
        }
    }

    /// Check a mandatory reference and return its id.
    pub async fn require(&self, kind: ReferenceKind, id: Option<Uuid>) -> Result<Uuid> {
        let id = id.ok_or_else(|| ControlError::missing_reference(kind))?;

        if self
            .directory
            .exists_in_organization(kind, self.organization, id)
            .await?
        {
            Ok(id)
        } else {
            debug!(
                kind = %kind,
                reference_id = %id,
                organization = %self.organization,
                "Reference rejected"
            );
            Err(ControlError::ReferenceInvalid { kind, id })
        }
    }

    /// Resolve a node and check that its datacenter is usable.
    pub async fn node_placement(&self, node: Option<Uuid>) -> Result<Node> {
        let node_id = node.ok_or_else(|| ControlError::missing_reference(ReferenceKind::Node))?;
        let node = self
            .directory
            .get_node(node_id)
            .await?
            .ok_or(ControlError::ReferenceInvalid {
                kind: ReferenceKind::Node,
                id: node_id,
            })?;

        self.zone(Some(node.zone)).await?;
        Ok(node)
    }

    /// Resolve a zone and a node inside it, checking the datacenter.
    pub async fn zone_placement(&self, zone: Option<Uuid>, node: Option<Uuid>) -> Result<(Zone, Node)> {
        let zone = self.zone(zone).await?;

        let node_id = node.ok_or_else(|| ControlError::missing_reference(ReferenceKind::Node))?;
        let node = self
            .directory
            .get_node(node_id)
            .await?
            .filter(|node| node.zone == zone.id)
            .ok_or(ControlError::ReferenceInvalid {
                kind: ReferenceKind::Node,
                id: node_id,
            })?;

        Ok((zone, node))
    }

    async fn zone(&self, zone: Option<Uuid>) -> Result<Zone> {
        let zone_id = zone.ok_or_else(|| ControlError::missing_reference(ReferenceKind::Zone))?;
        let zone = self
            .directory
            .get_zone(zone_id)
            .await?
            .ok_or(ControlError::ReferenceInvalid {
                kind: ReferenceKind::Zone,
                id: zone_id,
            })?;

        self.require(ReferenceKind::Datacenter, Some(zone.datacenter))
            .await?;
        Ok(zone)
    }

    /// Resolve an image the organization may use and whose data is readable.
    pub async fn available_image(&self, id: Uuid) -> Result<Image> {
        let image = self
            .directory
            .get_image(id)
            .await?
            .filter(|image| image.is_visible_to(self.organization))
            .ok_or_else(|| ControlError::validation("image_not_found", "Image not found"))?;

        let storage = self
            .directory
            .get_storage(image.storage)
            .await?
            .ok_or(ControlError::ReferenceInvalid {
                kind: ReferenceKind::Storage,
                id: image.storage,
            })?;

        if !self.availability.is_available(&storage, &image).await? {
            let message = match storage.kind {
                StorageKind::Oracle => "Image not restored from archive",
                StorageKind::Aws | StorageKind::Other => "Image not restored from glacier",
            };
            return Err(ControlError::validation("image_not_available", message));
        }

        Ok(image)
    }
}
