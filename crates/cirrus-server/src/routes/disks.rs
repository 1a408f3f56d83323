// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Disk routes.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use cirrus_core::disk::{Disk, DiskFilter, DiskRequest, DiskState};
use cirrus_core::disk_handlers;
use cirrus_core::persistence::{Page, Paged};
use cirrus_core::serde_ext;
use cirrus_core::state::{BulkIds, BulkStateRequest};

use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiQuery};
use crate::org::Organization;
use crate::state::AppState;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/disk",
            get(list_disks)
                .post(create_disk)
                .put(update_disk_states)
                .delete(delete_disks),
        )
        .route(
            "/disk/{id}",
            get(get_disk).put(update_disk).delete(delete_disk),
        )
}

/// Query parameters accepted by `GET /disk`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DiskListQuery {
    page: Option<u32>,
    page_count: Option<u32>,
    #[serde(deserialize_with = "serde_ext::reference")]
    id: Option<Uuid>,
    name: Option<String>,
    #[serde(deserialize_with = "serde_ext::reference")]
    instance: Option<Uuid>,
}

impl DiskListQuery {
    fn filter(&self) -> DiskFilter {
        DiskFilter {
            id: self.id,
            name: self.name.clone().filter(|n| !n.trim().is_empty()),
            instance: self.instance,
        }
    }
}

async fn list_disks(
    State(state): State<AppState>,
    Organization(org): Organization,
    ApiQuery(query): ApiQuery<DiskListQuery>,
) -> ApiResult<Json<Paged<Disk>>> {
    let page = Page::new(query.page, query.page_count);
    let disks = disk_handlers::handle_list_disks(&state.scoped(org), &query.filter(), page).await?;

    Ok(Json(disks))
}

async fn get_disk(
    State(state): State<AppState>,
    Organization(org): Organization,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Disk>> {
    let disk = disk_handlers::handle_get_disk(&state.scoped(org), id).await?;

    Ok(Json(disk))
}

async fn create_disk(
    State(state): State<AppState>,
    Organization(org): Organization,
    ApiJson(req): ApiJson<DiskRequest>,
) -> ApiResult<Json<Disk>> {
    let disk = disk_handlers::handle_create_disk(&state.scoped(org), req).await?;

    Ok(Json(disk))
}

async fn update_disk(
    State(state): State<AppState>,
    Organization(org): Organization,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<DiskRequest>,
) -> ApiResult<Json<Disk>> {
    let disk = disk_handlers::handle_update_disk(&state.scoped(org), id, req).await?;

    Ok(Json(disk))
}

async fn update_disk_states(
    State(state): State<AppState>,
    Organization(org): Organization,
    ApiJson(req): ApiJson<BulkStateRequest<DiskState>>,
) -> ApiResult<Json<Value>> {
    disk_handlers::handle_update_disk_states(&state.scoped(org), req).await?;

    Ok(Json(Value::Null))
}

async fn delete_disk(
    State(state): State<AppState>,
    Organization(org): Organization,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    disk_handlers::handle_delete_disk(&state.scoped(org), id).await?;

    Ok(Json(Value::Null))
}

async fn delete_disks(
    State(state): State<AppState>,
    Organization(org): Organization,
    ApiJson(ids): ApiJson<BulkIds>,
) -> ApiResult<Json<Value>> {
    disk_handlers::handle_delete_disks(&state.scoped(org), &ids.into_vec()).await?;

    Ok(Json(Value::Null))
}
