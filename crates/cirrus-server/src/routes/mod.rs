// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP routes.

mod disks;
mod health;
mod instances;

use axum::{Router, middleware};
use tower_http::trace::TraceLayer;

use crate::demo::reject_mutations;
use crate::state::AppState;

/// Build the router.
///
/// In demo mode every mutating request on the resource routes is refused.
pub fn create_app(state: AppState) -> Router {
    let mut resources = disks::routes().merge(instances::routes());
    if state.is_demo() {
        resources = resources.layer(middleware::from_fn(reject_mutations));
    }

    Router::new()
        .merge(health::routes()) // Health probe needs no organization
        .merge(resources)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
