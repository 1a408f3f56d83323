// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Change notifications published after successful commits.
//!
//! Publishing is fire-and-forget: a notifier logs its own failures and never
//! reports them back to the request that triggered it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::persistence::Persistence;

/// Change topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    /// One or more disks changed.
    #[serde(rename = "disk.change")]
    DiskChange,
    /// One or more instances changed.
    #[serde(rename = "instance.change")]
    InstanceChange,
}

impl Topic {
    /// Wire name of the topic.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::DiskChange => "disk.change",
            Topic::InstanceChange => "instance.change",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for change notifications.
#[async_trait]
pub trait EventNotifier: Send + Sync {
    /// Publish a change on `topic`.
    async fn publish(&self, topic: Topic);
}

/// Fans notifications out to in-process subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<Topic>,
}

impl BroadcastNotifier {
    /// Create a notifier buffering up to `capacity` undelivered topics per
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to future notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Topic> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EventNotifier for BroadcastNotifier {
    async fn publish(&self, topic: Topic) {
        if self.sender.send(topic).is_err() {
            debug!(topic = %topic, "No subscribers for change notification");
        }
    }
}

/// Appends notifications to the `events` table for agents to poll.
#[derive(Clone)]
pub struct StoreNotifier {
    store: Arc<dyn Persistence>,
}

impl StoreNotifier {
    /// Create a notifier writing through `store`.
    pub fn new(store: Arc<dyn Persistence>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventNotifier for StoreNotifier {
    async fn publish(&self, topic: Topic) {
        if let Err(e) = self.store.insert_event(topic).await {
            warn!(topic = %topic, error = %e, "Failed to record change notification");
        }
    }
}
