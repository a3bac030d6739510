// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the project lifecycle.

mod common;

use std::time::Duration;

use common::{TestContext, function_archive};
use stackblox_control::container::RuntimeCall;
use stackblox_control::container::mock::ops;
use stackblox_control::databases::{self, ProvisionRequest};
use stackblox_control::deploy;
use stackblox_control::error::Error;
use stackblox_control::persistence::Store;
use stackblox_control::persistence::memory::ops as store_ops;
use stackblox_control::projects;

fn postgres(name: &str) -> ProvisionRequest {
    ProvisionRequest {
        db_type: "postgres".to_string(),
        name: name.to_string(),
        version: None,
    }
}

#[tokio::test]
async fn test_create_project_provisions_network() {
    let ctx = TestContext::new();

    let project = projects::create_project(&ctx.state, "My Shop").await.unwrap();

    assert_eq!(project.name, "my-shop");
    assert_eq!(project.network_name, "net_my_shop");
    assert!(ctx.runtime.has_network("net_my_shop").await);
}

#[tokio::test]
async fn test_duplicate_project_conflicts() {
    let ctx = TestContext::new();
    ctx.project("shop").await;

    let err = projects::create_project(&ctx.state, "shop").await.unwrap_err();

    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(ctx.runtime.network_count().await, 1);
    assert_eq!(ctx.store.list_projects().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_names_normalizing_to_the_same_project_conflict() {
    let ctx = TestContext::new();
    ctx.project("My Shop").await;

    let err = projects::create_project(&ctx.state, "my-shop").await.unwrap_err();

    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(ctx.runtime.network_count().await, 1);
}

#[tokio::test]
async fn test_existing_network_conflicts() {
    let ctx = TestContext::new();
    ctx.runtime.add_network("net_shop").await;

    let err = projects::create_project(&ctx.state, "shop").await.unwrap_err();

    assert!(matches!(err, Error::Conflict(_)));
    assert!(ctx.store.list_projects().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_persist_failure_rolls_back_network() {
    let ctx = TestContext::new();
    ctx.store.fail_on(store_ops::CREATE_PROJECT).await;

    let err = projects::create_project(&ctx.state, "shop").await.unwrap_err();

    assert!(matches!(err, Error::Storage(_)));
    assert!(!ctx.runtime.has_network("net_shop").await);
}

#[tokio::test]
async fn test_dropped_create_still_rolls_back_network() {
    let ctx = TestContext::new();
    ctx.store
        .delay_on(store_ops::CREATE_PROJECT, Duration::from_millis(200))
        .await;
    ctx.store.fail_on(store_ops::CREATE_PROJECT).await;

    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        projects::create_project(&ctx.state, "shop"),
    )
    .await;
    assert!(outcome.is_err());
    assert!(ctx.runtime.has_network("net_shop").await);

    for _ in 0..100 {
        if !ctx.runtime.has_network("net_shop").await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!ctx.runtime.has_network("net_shop").await);
    assert!(ctx.store.list_projects().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dropped_create_still_records_project() {
    let ctx = TestContext::new();
    ctx.store
        .delay_on(store_ops::CREATE_PROJECT, Duration::from_millis(200))
        .await;

    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        projects::create_project(&ctx.state, "shop"),
    )
    .await;
    assert!(outcome.is_err());

    for _ in 0..100 {
        if ctx.store.find_project_by_name("shop").await.unwrap().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let project = ctx.store.find_project_by_name("shop").await.unwrap().unwrap();
    assert_eq!(project.network_name, "net_shop");
    assert!(ctx.runtime.has_network("net_shop").await);
}

#[tokio::test]
async fn test_failed_rollback_is_reported_with_original_error() {
    let ctx = TestContext::new();
    ctx.store.fail_on(store_ops::CREATE_PROJECT).await;
    ctx.runtime.fail_on(ops::REMOVE_NETWORK, "network busy").await;

    let err = projects::create_project(&ctx.state, "shop").await.unwrap_err();

    assert!(matches!(err.root(), Error::Storage(_)));
    assert!(err.to_string().contains("network busy"));
}

#[tokio::test]
async fn test_empty_name_is_rejected() {
    let ctx = TestContext::new();

    let err = projects::create_project(&ctx.state, "  ").await.unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(ctx.runtime.network_count().await, 0);
}

#[tokio::test]
async fn test_resolve_by_id_and_name() {
    let ctx = TestContext::new();
    let project = ctx.project("Order Service").await;

    let by_id = projects::resolve_project(&ctx.state, &project.id.to_string())
        .await
        .unwrap();
    let by_name = projects::resolve_project(&ctx.state, "order-service")
        .await
        .unwrap();
    let by_human_name = projects::resolve_project(&ctx.state, "Order Service")
        .await
        .unwrap();

    assert_eq!(by_id.project.id, project.id);
    assert_eq!(by_name.project.id, project.id);
    assert_eq!(by_human_name.project.id, project.id);
    assert!(by_id.functions.is_empty());
    assert!(by_id.databases.is_empty());
}

#[tokio::test]
async fn test_resolve_unknown_project() {
    let ctx = TestContext::new();

    let err = projects::resolve_project(&ctx.state, "missing").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let err = projects::resolve_project(&ctx.state, &uuid::Uuid::new_v4().to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_rename_keeps_network() {
    let ctx = TestContext::new();
    let project = ctx.project("shop").await;

    let renamed = projects::rename_project(&ctx.state, &project, "Store Front")
        .await
        .unwrap();

    assert_eq!(renamed.name, "store-front");
    assert_eq!(renamed.network_name, "net_shop");
    assert!(projects::resolve_project(&ctx.state, "store-front").await.is_ok());
}

#[tokio::test]
async fn test_delete_project_tears_down_in_order() {
    let ctx = TestContext::new();
    let project = ctx.project("shop").await;
    deploy::deploy_function(&ctx.state, &project, &function_archive("hello", "1.0.0"))
        .await
        .unwrap();
    let database = databases::provision_database(&ctx.state, &project, &postgres("orders"))
        .await
        .unwrap();

    let snapshot = projects::resolve_project(&ctx.state, "shop").await.unwrap();
    ctx.runtime.clear_calls().await;

    projects::delete_project(&ctx.state, &snapshot).await.unwrap();

    assert_eq!(
        ctx.runtime.calls().await,
        vec![
            RuntimeCall::RemoveImage("hello:1.0.0".to_string()),
            RuntimeCall::RemoveImage("hello:latest".to_string()),
            RuntimeCall::StopContainer(database.container_id.clone()),
            RuntimeCall::RemoveContainer(database.container_id.clone()),
            RuntimeCall::RemoveVolume(database.volume_name.clone()),
            RuntimeCall::RemoveNetwork("net_shop".to_string()),
        ]
    );
    assert!(!ctx.runtime.has_image("hello:1.0.0").await);
    assert!(ctx.runtime.container(&database.container_id).await.is_none());
    assert!(!ctx.runtime.has_volume(&database.volume_name).await);
    assert!(!ctx.runtime.has_network("net_shop").await);
    assert!(matches!(
        projects::resolve_project(&ctx.state, "shop").await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_failed_image_removal_stops_teardown() {
    let ctx = TestContext::new();
    let project = ctx.project("shop").await;
    deploy::deploy_function(&ctx.state, &project, &function_archive("hello", "1.0.0"))
        .await
        .unwrap();
    let database = databases::provision_database(&ctx.state, &project, &postgres("orders"))
        .await
        .unwrap();
    ctx.runtime.fail_on(ops::REMOVE_IMAGE, "image is in use").await;

    let snapshot = projects::resolve_project(&ctx.state, "shop").await.unwrap();
    let err = projects::delete_project(&ctx.state, &snapshot).await.unwrap_err();

    match &err {
        Error::Cleanup { resource, .. } => assert_eq!(resource, "image hello:1.0.0"),
        other => panic!("unexpected error: {:?}", other),
    }
    let container = ctx.runtime.container(&database.container_id).await.unwrap();
    assert!(container.running);
    assert!(ctx.runtime.has_volume(&database.volume_name).await);
    assert!(ctx.runtime.has_network("net_shop").await);
    assert!(projects::resolve_project(&ctx.state, "shop").await.is_ok());
}

#[tokio::test]
async fn test_retried_delete_skips_removed_resources() {
    let ctx = TestContext::new();
    let project = ctx.project("shop").await;
    deploy::deploy_function(&ctx.state, &project, &function_archive("hello", "1.0.0"))
        .await
        .unwrap();
    ctx.runtime.fail_on(ops::REMOVE_NETWORK, "endpoints attached").await;

    let snapshot = projects::resolve_project(&ctx.state, "shop").await.unwrap();
    let err = projects::delete_project(&ctx.state, &snapshot).await.unwrap_err();
    assert!(matches!(err, Error::Cleanup { .. }));
    assert!(!ctx.runtime.has_image("hello:1.0.0").await);

    ctx.runtime.clear_failure(ops::REMOVE_NETWORK).await;
    let snapshot = projects::resolve_project(&ctx.state, "shop").await.unwrap();
    projects::delete_project(&ctx.state, &snapshot).await.unwrap();

    assert!(!ctx.runtime.has_network("net_shop").await);
    assert!(ctx.store.list_projects().await.unwrap().is_empty());
}
