// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared handler state and per-request organization scope.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::directory::Directory;
use crate::events::{EventNotifier, Topic};
use crate::persistence::Persistence;
use crate::references::{ImageAvailability, ReferenceValidator, StorageClassAvailability};
use crate::serde_ext;

/// Collaborators shared by every lifecycle handler.
#[derive(Clone)]
pub struct LifecycleState {
    store: Arc<dyn Persistence>,
    directory: Arc<dyn Directory>,
    availability: Arc<dyn ImageAvailability>,
    notifier: Arc<dyn EventNotifier>,
    start_time: Instant,
    version: String,
}

impl LifecycleState {
    /// Create state from separate store, directory and notifier handles.
    ///
    /// Image availability defaults to [`StorageClassAvailability`].
    pub fn new(
        store: Arc<dyn Persistence>,
        directory: Arc<dyn Directory>,
        notifier: Arc<dyn EventNotifier>,
    ) -> Self {
        Self {
            store,
            directory,
            availability: Arc::new(StorageClassAvailability),
            notifier,
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Create state from a backend that serves both the store and the directory.
    pub fn from_store<S>(store: Arc<S>, notifier: Arc<dyn EventNotifier>) -> Self
    where
        S: Persistence + Directory + 'static,
    {
        Self::new(store.clone(), store, notifier)
    }

    /// Replace the image availability check.
    pub fn with_availability(mut self, availability: Arc<dyn ImageAvailability>) -> Self {
        self.availability = availability;
        self
    }

    /// Scope the state to one organization for the duration of a request.
    pub fn scoped(&self, organization: Uuid) -> RequestContext<'_> {
        RequestContext {
            organization,
            state: self,
        }
    }

    /// Resource store.
    pub fn store(&self) -> &dyn Persistence {
        self.store.as_ref()
    }

    /// Server uptime in milliseconds.
    pub fn uptime_ms(&self) -> i64 {
        i64::try_from(self.start_time.elapsed().as_millis()).unwrap_or(i64::MAX)
    }
}

/// Organization-scoped view of [`LifecycleState`] passed to every handler.
#[derive(Clone, Copy)]
pub struct RequestContext<'a> {
    organization: Uuid,
    state: &'a LifecycleState,
}

impl<'a> RequestContext<'a> {
    /// Organization the request acts for.
    pub fn organization(&self) -> Uuid {
        self.organization
    }

    /// Resource store.
    pub fn store(&self) -> &'a dyn Persistence {
        self.state.store.as_ref()
    }

    /// Collaborator directory.
    pub fn directory(&self) -> &'a dyn Directory {
        self.state.directory.as_ref()
    }

    /// Reference validator bound to this organization.
    pub fn references(&self) -> ReferenceValidator<'a> {
        ReferenceValidator::new(
            self.organization,
            self.state.directory.as_ref(),
            self.state.availability.as_ref(),
        )
    }

    /// Publish a change notification.
    pub async fn notify(&self, topic: Topic) {
        self.state.notifier.publish(topic).await;
    }
}

/// Uniform state change over a list of ids.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "S: FromStr"))]
pub struct BulkStateRequest<S> {
    /// Target ids.
    #[serde(default)]
    pub ids: Vec<Uuid>,
    /// Requested state; unknown values decode as absent and are rejected by
    /// the handler.
    #[serde(default, deserialize_with = "serde_ext::lenient_enum")]
    pub state: Option<S>,
}

/// Target ids of a bulk delete, either `{"ids": [...]}` or a bare array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BulkIds {
    /// Object form.
    Wrapped {
        /// Target ids.
        ids: Vec<Uuid>,
    },
    /// Array form.
    List(Vec<Uuid>),
}

impl BulkIds {
    /// The requested ids.
    pub fn into_vec(self) -> Vec<Uuid> {
        match self {
            BulkIds::Wrapped { ids } | BulkIds::List(ids) => ids,
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResponse {
    /// Whether the store answers queries.
    pub healthy: bool,
    /// Server version.
    pub version: String,
    /// Server uptime in milliseconds.
    pub uptime_ms: i64,
}

/// Report store health, version and uptime.
pub async fn handle_health_check(state: &LifecycleState) -> HealthCheckResponse {
    let healthy = state.store.health_check().await.unwrap_or(false);

    HealthCheckResponse {
        healthy,
        version: state.version.clone(),
        uptime_ms: state.uptime_ms(),
    }
}
