// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use cirrus_core::state::{HealthCheckResponse, handle_health_check};

use crate::state::AppState;

pub(super) fn routes() -> Router<AppState> {
    Router::new().route("/check", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(handle_health_check(state.lifecycle()).await)
}
