// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cirrus Core - Resource Lifecycle Engine
//!
//! This crate owns the authoritative state of tenant disks and instances. Every
//! mutation goes through reference checks, a lifecycle rule set, a partial
//! commit that writes only the fields the request may change, and a change
//! notification.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        cirrus-server                          │
//! │        (HTTP binding, organization scope, demo mode)          │
//! └──────────────────────────────────────────────────────────────┘
//!                               │ RequestContext
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │       disk_handlers / instance_handlers (this crate)          │
//! │   ReferenceValidator → transition rules → validate()          │
//! └──────────────────────────────────────────────────────────────┘
//!          │                        │                     │
//!          ▼                        ▼                     ▼
//! ┌─────────────────┐   ┌─────────────────────┐   ┌────────────────┐
//! │   Directory     │   │ Persistence         │   │ EventNotifier  │
//! │ (zones, nodes,  │   │ commit(FieldSet)    │   │ disk.change    │
//! │  vpcs, images)  │   │ PostgreSQL / SQLite │   │ instance.change│
//! └─────────────────┘   └─────────────────────┘   └────────────────┘
//! ```
//!
//! # Disk State Machine
//!
//! ```text
//!               snapshot / backup / expand
//!   ┌───────────┐ ─────────────────────────▶ ┌──────────────────────────┐
//!   │ AVAILABLE │                            │ SNAPSHOT / BACKUP / EXPAND│
//!   └───────────┘ ◀───────────────────────── └──────────────────────────┘
//!         ▲               (agent)                        │ restore
//!         │                                              ▼
//!         │                                        ┌──────────┐
//!         └─────────────── (agent) ────────────────│ RESTORE  │
//!                                                  └──────────┘
//! ```
//!
//! Requesting `restore` on an `available` disk fails with `disk_restore_active`.
//! Any pair not shown is a no-op. See [`disk::disk_transition`].
//!
//! # Instance States
//!
//! | State | Description |
//! |-------|-------------|
//! | `provision` | Being provisioned by the agent |
//! | `start` | Should be running (default on create) |
//! | `stop` | Should be stopped |
//! | `cleanup` | Resources being released |
//! | `restart` | Should be restarted |
//! | `destroy` | Should be destroyed |
//!
//! Any state other than `start` clears the `restart` and `restart_block_ip` flags.
//!
//! # Partial Commits
//!
//! Updates declare the fields they may write as a [`field_set::FieldSet`].
//! The store turns the set into an `UPDATE` naming exactly those columns, so
//! attributes written by the hypervisor agent (`vm_state`, addresses) are never
//! clobbered by a concurrent controller write.
//!
//! # Modules
//!
//! - [`disk`], [`instance`]: entities, states and validation
//! - [`disk_handlers`], [`instance_handlers`]: lifecycle operations
//! - [`persistence`]: store trait with PostgreSQL and SQLite backends
//! - [`directory`], [`references`]: collaborator lookups and ownership checks
//! - [`events`]: change notification
//! - [`error`]: error type with client error codes

#![warn(missing_docs)]

/// Read-only lookups of zones, nodes, images and storages.
pub mod directory;

/// Disk entity, transition table and validation.
pub mod disk;

/// Disk lifecycle handlers.
pub mod disk_handlers;

/// Error types with client error code mapping.
pub mod error;

/// Change notification topics and notifiers.
pub mod events;

/// Typed field sets for partial commits.
pub mod field_set;

/// Instance entity and validation.
pub mod instance;

/// Instance lifecycle handlers.
pub mod instance_handlers;

/// Embedded database migrations.
pub mod migrations;

/// Name filtering and bulk name templates.
pub mod naming;

/// Store trait and backends.
pub mod persistence;

/// Reference ownership checks and image availability.
pub mod references;

/// Lenient deserializers for request payloads.
pub mod serde_ext;

/// Shared handler state and request scope.
pub mod state;

pub use error::{ControlError, ErrorData, Result};
pub use state::{LifecycleState, RequestContext};
