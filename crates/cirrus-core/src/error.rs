// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for cirrus-core.
//!
//! Provides a unified error type that maps to the structured `ErrorData`
//! payload returned to API clients.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Result type using ControlError
pub type Result<T> = std::result::Result<T, ControlError>;

/// Kind of resource owned by the lifecycle controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A virtual block device.
    Disk,
    /// A virtual compute resource.
    Instance,
    /// An image used as a disk source or restore point.
    Image,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Disk => write!(f, "disk"),
            ResourceKind::Instance => write!(f, "instance"),
            ResourceKind::Image => write!(f, "image"),
        }
    }
}

/// Kind of entity a disk or instance may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// Datacenter owning a zone.
    Datacenter,
    /// Availability zone owning nodes.
    Zone,
    /// Hypervisor node.
    Node,
    /// Virtual private cloud.
    Vpc,
    /// DNS domain.
    Domain,
    /// Disk image.
    Image,
    /// Backing store for images.
    Storage,
    /// Compute instance (as a disk attachment target).
    Instance,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReferenceKind::Datacenter => "datacenter",
            ReferenceKind::Zone => "zone",
            ReferenceKind::Node => "node",
            ReferenceKind::Vpc => "vpc",
            ReferenceKind::Domain => "domain",
            ReferenceKind::Image => "image",
            ReferenceKind::Storage => "storage",
            ReferenceKind::Instance => "instance",
        };
        f.write_str(name)
    }
}

/// Structured client-facing error payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    /// Machine-readable error code (e.g. `disk_restore_active`).
    pub error: String,
    /// Human-readable message.
    pub error_msg: String,
}

/// Errors that can occur while processing a lifecycle request.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ControlError {
    /// Resource is absent or belongs to another organization.
    #[error("{kind} '{id}' not found")]
    NotFound {
        /// Kind of the missing resource.
        kind: ResourceKind,
        /// Requested id.
        id: Uuid,
    },

    /// A referenced entity is missing, foreign, or unusable.
    ///
    /// A nil id means the reference was required but not supplied.
    #[error("{kind} reference '{id}' cannot be used")]
    ReferenceInvalid {
        /// Kind of the referenced entity.
        kind: ReferenceKind,
        /// The referenced id.
        id: Uuid,
    },

    /// The request is well-formed but violates a lifecycle rule.
    #[error("{message}")]
    Validation {
        /// Machine-readable error code.
        code: &'static str,
        /// Human-readable message.
        message: String,
    },

    /// Backing store operation failed.
    #[error("Database error during '{operation}': {details}")]
    Database {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl ControlError {
    /// Build a validation error.
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
        }
    }

    /// Build a reference error for a required reference that was not supplied.
    pub fn missing_reference(kind: ReferenceKind) -> Self {
        Self::ReferenceInvalid {
            kind,
            id: Uuid::nil(),
        }
    }

    /// Get the error code string for this error.
    pub fn error_code(&self) -> &str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::ReferenceInvalid { .. } => "reference_invalid",
            Self::Validation { code, .. } => *code,
            Self::Database { .. } => "database_error",
        }
    }

    /// Whether this error was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Database { .. })
    }

    /// Convert this error to the client-facing payload.
    ///
    /// Backing-store details stay in the logs; the payload is opaque.
    pub fn to_error_data(&self) -> ErrorData {
        let error_msg = match self {
            Self::Database { .. } => "Internal server error".to_string(),
            other => other.to_string(),
        };

        ErrorData {
            error: self.error_code().to_string(),
            error_msg,
        }
    }
}

impl From<sqlx::Error> for ControlError {
    fn from(err: sqlx::Error) -> Self {
        ControlError::Database {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for ControlError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        ControlError::Database {
            operation: "migrate".to_string(),
            details: err.to_string(),
        }
    }
}
