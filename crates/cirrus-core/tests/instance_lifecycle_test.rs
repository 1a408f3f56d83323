// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance lifecycle tests against an in-memory SQLite store.

mod common;

use common::{Fixture, drain, seed_image, seed_vpc};
use uuid::Uuid;

use cirrus_core::ControlError;
use cirrus_core::error::{ReferenceKind, ResourceKind};
use cirrus_core::events::Topic;
use cirrus_core::instance::{Instance, InstanceFilter, InstanceRequest, InstanceState};
use cirrus_core::instance_handlers::*;
use cirrus_core::persistence::{Page, Persistence};
use cirrus_core::state::BulkStateRequest;

fn update_from(instance: &Instance) -> InstanceRequest {
    InstanceRequest {
        name: instance.name.clone(),
        vpc: Some(instance.vpc),
        domain: instance.domain,
        memory: instance.memory,
        processors: instance.processors,
        network_roles: instance.network_roles.clone(),
        vnc: instance.vnc,
        delete_protection: instance.delete_protection,
        no_public_address: instance.no_public_address,
        no_host_address: instance.no_host_address,
        ..Default::default()
    }
}

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn test_create_single_instance() {
    let fx = Fixture::new().await;
    let mut rx = fx.notifier.subscribe();

    let created = handle_create_instances(&fx.ctx(), fx.instance_request())
        .await
        .unwrap();
    let OneOrMany::One(instance) = created else {
        panic!("expected a single instance");
    };

    assert_eq!(instance.name, "web");
    assert_eq!(instance.state, InstanceState::Start);
    assert_eq!(instance.zone, fx.zone);
    assert_eq!(instance.node, fx.node);
    assert_eq!(instance.image, Some(fx.image));
    assert!(instance.vnc_password.is_empty());

    let stored = fx.store.get_instance(instance.id).await.unwrap().unwrap();
    assert_eq!(stored.memory, 1024);
    assert_eq!(stored.processors, 2);
    assert_eq!(drain(&mut rx), vec![Topic::InstanceChange]);
}

#[tokio::test]
async fn test_create_batch_from_template() {
    let fx = Fixture::new().await;
    let mut rx = fx.notifier.subscribe();

    let created = handle_create_instances(
        &fx.ctx(),
        InstanceRequest {
            name: "web-%d".to_string(),
            count: 3,
            ..fx.instance_request()
        },
    )
    .await
    .unwrap();
    let OneOrMany::Many(instances) = created else {
        panic!("expected a batch");
    };

    let names: Vec<_> = instances.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["web-1", "web-2", "web-3"]);

    // One notification per batch.
    assert_eq!(drain(&mut rx), vec![Topic::InstanceChange]);
}

#[tokio::test]
async fn test_create_count_zero_means_one() {
    let fx = Fixture::new().await;

    let created = handle_create_instances(
        &fx.ctx(),
        InstanceRequest {
            name: "db-%d".to_string(),
            count: 0,
            ..fx.instance_request()
        },
    )
    .await
    .unwrap();

    let instances = created.into_vec();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].name, "db-1");
}

#[tokio::test]
async fn test_create_count_cap() {
    let fx = Fixture::new().await;

    let err = handle_create_instances(
        &fx.ctx(),
        InstanceRequest {
            count: 257,
            ..fx.instance_request()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.error_code(), "instance_count_invalid");

    let listed = handle_list_instances(&fx.ctx(), &InstanceFilter::default(), Page::default())
        .await
        .unwrap();
    assert_eq!(listed.count, 0);
}

#[tokio::test]
async fn test_partial_batch_keeps_created_and_notifies() {
    let fx = Fixture::new().await;
    sqlx::query(
        "CREATE TRIGGER reject_third BEFORE INSERT ON instances \
         WHEN NEW.name = 'node-3' BEGIN SELECT RAISE(ABORT, 'rejected'); END",
    )
    .execute(fx.pool())
    .await
    .unwrap();
    let mut rx = fx.notifier.subscribe();

    let err = handle_create_instances(
        &fx.ctx(),
        InstanceRequest {
            name: "node-%d".to_string(),
            count: 5,
            ..fx.instance_request()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ControlError::Database { .. }));

    let listed = handle_list_instances(&fx.ctx(), &InstanceFilter::default(), Page::default())
        .await
        .unwrap();
    let names: Vec<_> = listed.items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["node-1", "node-2"]);
    assert_eq!(drain(&mut rx), vec![Topic::InstanceChange]);
}

#[tokio::test]
async fn test_create_validation_errors() {
    let fx = Fixture::new().await;

    let cases = [
        (
            InstanceRequest {
                memory: 128,
                ..fx.instance_request()
            },
            "memory_size_invalid",
        ),
        (
            InstanceRequest {
                processors: 0,
                ..fx.instance_request()
            },
            "processors_invalid",
        ),
        (
            InstanceRequest {
                init_disk_size: 5,
                ..fx.instance_request()
            },
            "init_disk_size_invalid",
        ),
        (
            InstanceRequest {
                image: None,
                ..fx.instance_request()
            },
            "image_not_found",
        ),
    ];

    for (request, code) in cases {
        let err = handle_create_instances(&fx.ctx(), request).await.unwrap_err();
        assert_eq!(err.error_code(), code);
    }
}

#[tokio::test]
async fn test_create_reference_errors() {
    let fx = Fixture::new().await;

    let err = handle_create_instances(
        &fx.ctx(),
        InstanceRequest {
            zone: None,
            ..fx.instance_request()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        ControlError::ReferenceInvalid {
            kind: ReferenceKind::Zone,
            ..
        }
    ));

    // A node from another zone does not belong to the requested zone.
    let other_zone = common::seed_zone(fx.pool(), fx.datacenter).await;
    let stray_node = common::seed_node(fx.pool(), other_zone).await;
    let err = handle_create_instances(
        &fx.ctx(),
        InstanceRequest {
            node: Some(stray_node),
            ..fx.instance_request()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        ControlError::ReferenceInvalid { kind: ReferenceKind::Node, id } if id == stray_node
    ));

    let foreign_vpc = seed_vpc(fx.pool(), Uuid::new_v4()).await;
    let err = handle_create_instances(
        &fx.ctx(),
        InstanceRequest {
            vpc: Some(foreign_vpc),
            ..fx.instance_request()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        ControlError::ReferenceInvalid {
            kind: ReferenceKind::Vpc,
            ..
        }
    ));

    let err = handle_create_instances(
        &fx.ctx(),
        InstanceRequest {
            domain: Some(Uuid::new_v4()),
            ..fx.instance_request()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        ControlError::ReferenceInvalid {
            kind: ReferenceKind::Domain,
            ..
        }
    ));

    let archived = seed_image(fx.pool(), None, fx.storage, "DEEP_ARCHIVE", None).await;
    let err = handle_create_instances(
        &fx.ctx(),
        InstanceRequest {
            image: Some(archived),
            ..fx.instance_request()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.error_code(), "image_not_available");
}

#[tokio::test]
async fn test_create_with_vnc_and_roles() {
    let fx = Fixture::new().await;

    let instance = handle_create_instances(
        &fx.ctx(),
        InstanceRequest {
            vnc: true,
            network_roles: vec![" web ".to_string(), "db".to_string(), "web".to_string(), "".to_string()],
            domain: Some(fx.domain),
            ..fx.instance_request()
        },
    )
    .await
    .unwrap()
    .into_vec()
    .remove(0);

    assert_eq!(instance.vnc_password.len(), 16);
    assert!((1..=9999).contains(&instance.vnc_display));
    assert_eq!(instance.network_roles, vec!["db", "web"]);
    assert_eq!(instance.domain, Some(fx.domain));
}

// ============================================================================
// Update
// ============================================================================

#[tokio::test]
async fn test_update_preserves_agent_fields() {
    let fx = Fixture::new().await;
    let instance = fx.create_instance().await;

    fx.agent_report(instance.id, "running", "203.0.113.7").await;

    let updated = handle_update_instance(
        &fx.ctx(),
        instance.id,
        InstanceRequest {
            name: "renamed".to_string(),
            memory: 2048,
            ..update_from(&instance)
        },
    )
    .await
    .unwrap();
    assert_eq!(updated.name, "renamed");

    let stored = fx.store.get_instance(instance.id).await.unwrap().unwrap();
    assert_eq!(stored.name, "renamed");
    assert_eq!(stored.memory, 2048);
    assert_eq!(stored.vm_state, "running");
    assert_eq!(stored.public_ips, vec!["203.0.113.7"]);
}

#[tokio::test]
async fn test_update_state_only_when_supplied() {
    let fx = Fixture::new().await;
    let instance = fx.create_instance().await;
    fx.request_restart(instance.id).await;

    let stopped = handle_update_instance(
        &fx.ctx(),
        instance.id,
        InstanceRequest {
            state: Some(InstanceState::Stop),
            ..update_from(&instance)
        },
    )
    .await
    .unwrap();
    assert_eq!(stopped.state, InstanceState::Stop);
    assert!(!stopped.restart);

    let stored = fx.store.get_instance(instance.id).await.unwrap().unwrap();
    assert!(!stored.restart);
    assert!(!stored.restart_block_ip);

    let unchanged = handle_update_instance(
        &fx.ctx(),
        instance.id,
        InstanceRequest {
            state: None,
            ..update_from(&stopped)
        },
    )
    .await
    .unwrap();
    assert_eq!(unchanged.state, InstanceState::Stop);

    let stored = fx.store.get_instance(instance.id).await.unwrap().unwrap();
    assert_eq!(stored.state, InstanceState::Stop);
}

#[tokio::test]
async fn test_rename_keeps_pending_restart() {
    let fx = Fixture::new().await;
    let instance = fx.create_instance().await;
    fx.request_restart(instance.id).await;

    let renamed = handle_update_instance(
        &fx.ctx(),
        instance.id,
        InstanceRequest {
            name: "renamed".to_string(),
            vpc: Some(instance.vpc),
            memory: instance.memory,
            processors: instance.processors,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(renamed.state, InstanceState::Start);
    assert!(renamed.restart);
    assert!(renamed.restart_block_ip);

    let stored = fx.store.get_instance(instance.id).await.unwrap().unwrap();
    assert_eq!(stored.name, "renamed");
    assert!(stored.restart);
    assert!(stored.restart_block_ip);

    // Restating `start` leaves the restart request in place as well.
    handle_update_instance(
        &fx.ctx(),
        instance.id,
        InstanceRequest {
            state: Some(InstanceState::Start),
            ..update_from(&stored)
        },
    )
    .await
    .unwrap();
    let stored = fx.store.get_instance(instance.id).await.unwrap().unwrap();
    assert!(stored.restart);
}

#[tokio::test]
async fn test_update_vpc_required_and_checked() {
    let fx = Fixture::new().await;
    let instance = fx.create_instance().await;

    let err = handle_update_instance(
        &fx.ctx(),
        instance.id,
        InstanceRequest {
            vpc: None,
            ..update_from(&instance)
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        ControlError::ReferenceInvalid {
            kind: ReferenceKind::Vpc,
            ..
        }
    ));

    let other_vpc = seed_vpc(fx.pool(), fx.org).await;
    let moved = handle_update_instance(
        &fx.ctx(),
        instance.id,
        InstanceRequest {
            vpc: Some(other_vpc),
            ..update_from(&instance)
        },
    )
    .await
    .unwrap();
    assert_eq!(moved.vpc, other_vpc);
}

#[tokio::test]
async fn test_delete_protection_propagates_to_disks() {
    let fx = Fixture::new().await;
    let instance = fx.create_instance().await;
    let first = fx.create_attached_disk(&instance, "0").await;
    let second = fx.create_attached_disk(&instance, "1").await;
    let loose = fx.create_disk(fx.disk_request()).await;
    let mut rx = fx.notifier.subscribe();

    handle_update_instance(
        &fx.ctx(),
        instance.id,
        InstanceRequest {
            delete_protection: true,
            ..update_from(&instance)
        },
    )
    .await
    .unwrap();

    for id in [first.id, second.id] {
        assert!(fx.store.get_disk(id).await.unwrap().unwrap().delete_protection);
    }
    assert!(!fx.store.get_disk(loose.id).await.unwrap().unwrap().delete_protection);
    assert_eq!(
        drain(&mut rx),
        vec![Topic::InstanceChange, Topic::DiskChange]
    );

    // Unchanged protection leaves the disks alone.
    let protected = fx.store.get_instance(instance.id).await.unwrap().unwrap();
    handle_update_instance(&fx.ctx(), instance.id, update_from(&protected))
        .await
        .unwrap();
    assert_eq!(drain(&mut rx), vec![Topic::InstanceChange]);
}

#[tokio::test]
async fn test_instances_invisible_to_other_organizations() {
    let fx = Fixture::new().await;
    let instance = fx.create_instance().await;
    let foreign = fx.foreign_ctx();

    let err = handle_get_instance(&foreign, instance.id).await.unwrap_err();
    assert!(matches!(
        err,
        ControlError::NotFound {
            kind: ResourceKind::Instance,
            ..
        }
    ));

    let updated = handle_update_instance_states(
        &foreign,
        BulkStateRequest {
            ids: vec![instance.id],
            state: Some(InstanceState::Stop),
        },
    )
    .await
    .unwrap();
    assert_eq!(updated, 0);

    let deleted = handle_delete_instances(&foreign, &[instance.id]).await.unwrap();
    assert_eq!(deleted, 0);
    assert!(fx.store.get_instance(instance.id).await.unwrap().is_some());
}

// ============================================================================
// Bulk state
// ============================================================================

#[tokio::test]
async fn test_bulk_instance_states() {
    let fx = Fixture::new().await;
    let instances = handle_create_instances(
        &fx.ctx(),
        InstanceRequest {
            name: "app-%d".to_string(),
            count: 2,
            ..fx.instance_request()
        },
    )
    .await
    .unwrap()
    .into_vec();
    let ids: Vec<Uuid> = instances.iter().map(|i| i.id).collect();
    for id in &ids {
        fx.request_restart(*id).await;
    }

    let updated = handle_update_instance_states(
        &fx.ctx(),
        BulkStateRequest {
            ids: ids.clone(),
            state: Some(InstanceState::Stop),
        },
    )
    .await
    .unwrap();
    assert_eq!(updated, 2);

    for id in &ids {
        let stored = fx.store.get_instance(*id).await.unwrap().unwrap();
        assert_eq!(stored.state, InstanceState::Stop);
        assert!(!stored.restart);
        assert!(!stored.restart_block_ip);
    }

    for state in [
        Some(InstanceState::Provision),
        Some(InstanceState::Cleanup),
        Some(InstanceState::Destroy),
        None,
    ] {
        let err = handle_update_instance_states(
            &fx.ctx(),
            BulkStateRequest {
                ids: ids.clone(),
                state,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), "invalid_state");
    }
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn test_delete_instance_detaches_disks() {
    let fx = Fixture::new().await;
    let instance = fx.create_instance().await;
    let disk = fx.create_attached_disk(&instance, "0").await;

    handle_delete_instance(&fx.ctx(), instance.id).await.unwrap();

    assert!(fx.store.get_instance(instance.id).await.unwrap().is_none());
    let disk = fx.store.get_disk(disk.id).await.unwrap().unwrap();
    assert_eq!(disk.instance, None);
}

#[tokio::test]
async fn test_delete_protected_instance_fails() {
    let fx = Fixture::new().await;
    let instance = handle_create_instances(
        &fx.ctx(),
        InstanceRequest {
            delete_protection: true,
            ..fx.instance_request()
        },
    )
    .await
    .unwrap()
    .into_vec()
    .remove(0);

    let err = handle_delete_instance(&fx.ctx(), instance.id).await.unwrap_err();
    assert_eq!(err.error_code(), "delete_protection");

    let deleted = handle_delete_instances(&fx.ctx(), &[instance.id]).await.unwrap();
    assert_eq!(deleted, 0);

    handle_delete_instance(&fx.ctx(), Uuid::new_v4()).await.unwrap();
}

#[tokio::test]
async fn test_delete_protected_after_read_fails() {
    let fx = Fixture::new().await;
    let instance = fx.create_instance().await;
    fx.protect_on_delete("instances").await;
    let mut rx = fx.notifier.subscribe();

    let err = handle_delete_instance(&fx.ctx(), instance.id).await.unwrap_err();
    assert_eq!(err.error_code(), "delete_protection");

    let stored = fx.store.get_instance(instance.id).await.unwrap().unwrap();
    assert!(stored.delete_protection);
    assert!(drain(&mut rx).is_empty());
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn test_list_instances_filters() {
    let fx = Fixture::new().await;
    handle_create_instances(
        &fx.ctx(),
        InstanceRequest {
            name: "web-%d".to_string(),
            count: 2,
            network_roles: vec!["web".to_string()],
            ..fx.instance_request()
        },
    )
    .await
    .unwrap();
    handle_create_instances(
        &fx.ctx(),
        InstanceRequest {
            name: "db".to_string(),
            network_roles: vec!["db".to_string()],
            ..fx.instance_request()
        },
    )
    .await
    .unwrap();

    let web = handle_list_instances(
        &fx.ctx(),
        &InstanceFilter {
            network_role: Some("web".to_string()),
            ..Default::default()
        },
        Page::default(),
    )
    .await
    .unwrap();
    assert_eq!(web.count, 2);

    let by_name = handle_list_instances(
        &fx.ctx(),
        &InstanceFilter {
            name: Some("DB".to_string()),
            zone: Some(fx.zone),
            ..Default::default()
        },
        Page::default(),
    )
    .await
    .unwrap();
    assert_eq!(by_name.items.len(), 1);
    assert_eq!(by_name.items[0].name, "db");

    let elsewhere = handle_list_instances(
        &fx.ctx(),
        &InstanceFilter {
            vpc: Some(Uuid::new_v4()),
            ..Default::default()
        },
        Page::default(),
    )
    .await
    .unwrap();
    assert_eq!(elsewhere.count, 0);
}

#[tokio::test]
async fn test_list_instance_names_by_node() {
    let fx = Fixture::new().await;
    let created = handle_create_instances(
        &fx.ctx(),
        InstanceRequest {
            name: "vm-%d".to_string(),
            count: 2,
            ..fx.instance_request()
        },
    )
    .await
    .unwrap()
    .into_vec();

    let names = handle_list_instance_names(&fx.ctx(), fx.node).await.unwrap();
    assert_eq!(names.len(), 2);
    assert_eq!(names[0].id, created[0].id);
    assert_eq!(names[0].name, "vm-1");

    let empty = handle_list_instance_names(&fx.ctx(), Uuid::new_v4()).await.unwrap();
    assert!(empty.is_empty());
}
