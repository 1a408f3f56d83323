// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance routes.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use cirrus_core::instance::{Instance, InstanceFilter, InstanceRequest, InstanceState};
use cirrus_core::instance_handlers::{self, OneOrMany};
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
            "/instance",
            get(list_instances)
                .post(create_instances)
                .put(update_instance_states)
                .delete(delete_instances),
        )
        .route(
            "/instance/{id}",
            get(get_instance).put(update_instance).delete(delete_instance),
        )
}

/// Query parameters accepted by `GET /instance`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InstanceListQuery {
    page: Option<u32>,
    page_count: Option<u32>,
    #[serde(deserialize_with = "serde_ext::reference")]
    id: Option<Uuid>,
    name: Option<String>,
    #[serde(deserialize_with = "serde_ext::reference")]
    node: Option<Uuid>,
    #[serde(deserialize_with = "serde_ext::reference")]
    zone: Option<Uuid>,
    #[serde(deserialize_with = "serde_ext::reference")]
    vpc: Option<Uuid>,
    network_role: Option<String>,
    /// Switches the response to `[{id, name}]` of the instances on this node.
    #[serde(deserialize_with = "serde_ext::reference")]
    node_names: Option<Uuid>,
}

impl InstanceListQuery {
    fn filter(&self) -> InstanceFilter {
        InstanceFilter {
            id: self.id,
            name: self.name.clone().filter(|n| !n.trim().is_empty()),
            node: self.node,
            zone: self.zone,
            vpc: self.vpc,
            network_role: self.network_role.clone().filter(|r| !r.trim().is_empty()),
        }
    }
}

async fn list_instances(
    State(state): State<AppState>,
    Organization(org): Organization,
    ApiQuery(query): ApiQuery<InstanceListQuery>,
) -> ApiResult<Response> {
    let ctx = state.scoped(org);

    if let Some(node) = query.node_names {
        let names = instance_handlers::handle_list_instance_names(&ctx, node).await?;
        return Ok(Json(names).into_response());
    }

    let page = Page::new(query.page, query.page_count);
    let instances = instance_handlers::handle_list_instances(&ctx, &query.filter(), page).await?;

    let instances = Paged {
        items: state.present_all(instances.items),
        count: instances.count,
    };
    Ok(Json(instances).into_response())
}

async fn get_instance(
    State(state): State<AppState>,
    Organization(org): Organization,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Instance>> {
    let instance = instance_handlers::handle_get_instance(&state.scoped(org), id).await?;

    Ok(Json(state.present(instance)))
}

async fn create_instances(
    State(state): State<AppState>,
    Organization(org): Organization,
    ApiJson(req): ApiJson<InstanceRequest>,
) -> ApiResult<Json<OneOrMany<Instance>>> {
    let created = match instance_handlers::handle_create_instances(&state.scoped(org), req).await? {
        OneOrMany::One(instance) => OneOrMany::One(state.present(instance)),
        OneOrMany::Many(instances) => OneOrMany::Many(state.present_all(instances)),
    };

    Ok(Json(created))
}

async fn update_instance(
    State(state): State<AppState>,
    Organization(org): Organization,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<InstanceRequest>,
) -> ApiResult<Json<Instance>> {
    let instance = instance_handlers::handle_update_instance(&state.scoped(org), id, req).await?;

    Ok(Json(state.present(instance)))
}

async fn update_instance_states(
    State(state): State<AppState>,
    Organization(org): Organization,
    ApiJson(req): ApiJson<BulkStateRequest<InstanceState>>,
) -> ApiResult<Json<Value>> {
    instance_handlers::handle_update_instance_states(&state.scoped(org), req).await?;

    Ok(Json(Value::Null))
}

async fn delete_instance(
    State(state): State<AppState>,
    Organization(org): Organization,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    instance_handlers::handle_delete_instance(&state.scoped(org), id).await?;

    Ok(Json(Value::Null))
}

async fn delete_instances(
    State(state): State<AppState>,
    Organization(org): Organization,
    ApiJson(ids): ApiJson<BulkIds>,
) -> ApiResult<Json<Value>> {
    instance_handlers::handle_delete_instances(&state.scoped(org), &ids.into_vec()).await?;

    Ok(Json(Value::Null))
}
