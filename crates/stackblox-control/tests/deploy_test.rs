// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the function deploy pipeline.

mod common;

use common::{TestContext, function_archive, tar_gz};
use stackblox_control::container::RuntimeCall;
use stackblox_control::container::mock::ops;
use stackblox_control::deploy;
use stackblox_control::error::Error;
use stackblox_control::model::Language;
use stackblox_control::persistence::Store;
use stackblox_control::persistence::memory::ops as store_ops;

fn context_files(context: &[u8]) -> Vec<(String, String)> {
    use std::io::Read;

    let mut archive = tar::Archive::new(context);
    let mut files = Vec::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry.path().unwrap().to_string_lossy().into_owned();
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        files.push((path.trim_start_matches("./").to_string(), content));
    }
    files
}

#[tokio::test]
async fn test_deploy_builds_and_records_function() {
    let ctx = TestContext::new();
    let project = ctx.project("shop").await;

    let function = deploy::deploy_function(&ctx.state, &project, &function_archive("Hello World", "1.0.0"))
        .await
        .unwrap();

    assert_eq!(function.slug, "hello-world");
    assert_eq!(function.version, "1.0.0");
    assert_eq!(function.language, Language::NodeJs);
    assert_eq!(function.project_id, project.id);
    assert!(
        ctx.runtime
            .calls()
            .await
            .contains(&RuntimeCall::BuildImage(vec![
                "hello-world:1.0.0".to_string(),
                "hello-world:latest".to_string(),
            ]))
    );
    assert!(ctx.runtime.has_image("hello-world:1.0.0").await);
    assert!(ctx.runtime.has_image("hello-world:latest").await);
    assert_eq!(ctx.staged_entries(), 0);
}

#[tokio::test]
async fn test_build_context_carries_rendered_files() {
    let ctx = TestContext::new();
    let project = ctx.project("shop").await;

    deploy::deploy_function(&ctx.state, &project, &function_archive("hello", "1.0.0"))
        .await
        .unwrap();

    let contexts = ctx.runtime.build_contexts().await;
    assert_eq!(contexts.len(), 1);
    let files = context_files(&contexts[0]);
    let file = |name: &str| {
        files
            .iter()
            .find(|(path, _)| path == name)
            .map(|(_, content)| content.clone())
            .unwrap_or_else(|| panic!("{} missing from build context", name))
    };

    let dockerfile = file("Dockerfile");
    assert!(dockerfile.starts_with("FROM node:18"));
    assert!(dockerfile.contains("RUN npm install"));
    assert!(file("entrypoint.js").contains("require(\"./index.js\")"));
    assert!(file("index.js").contains("module.exports"));
    assert!(file("package.json").contains("\"hello\""));
}

#[tokio::test]
async fn test_redeploy_upserts() {
    let ctx = TestContext::new();
    let project = ctx.project("shop").await;
    let archive = function_archive("hello", "1.0.0");

    let first = deploy::deploy_function(&ctx.state, &project, &archive)
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = deploy::deploy_function(&ctx.state, &project, &archive)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert!(second.updated_at > first.updated_at);
    assert_eq!(second.created_at, first.created_at);
    assert_eq!(
        ctx.store
            .function_row_count(project.id, "hello", "1.0.0")
            .await,
        1
    );
}

#[tokio::test]
async fn test_new_version_adds_row() {
    let ctx = TestContext::new();
    let project = ctx.project("shop").await;

    deploy::deploy_function(&ctx.state, &project, &function_archive("hello", "1.0.0"))
        .await
        .unwrap();
    deploy::deploy_function(&ctx.state, &project, &function_archive("hello", "1.1.0"))
        .await
        .unwrap();

    let functions = ctx.store.list_functions(project.id).await.unwrap();
    assert_eq!(functions.len(), 2);
    let latest = ctx
        .store
        .find_latest_function(project.id, "hello")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.version, "1.1.0");
}

#[tokio::test]
async fn test_build_failure_leaves_nothing_behind() {
    let ctx = TestContext::new();
    let project = ctx.project("shop").await;
    ctx.runtime.fail_on(ops::BUILD_IMAGE, "npm install failed").await;

    let err = deploy::deploy_function(&ctx.state, &project, &function_archive("hello", "1.0.0"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Runtime(_)));
    assert!(ctx.store.list_functions(project.id).await.unwrap().is_empty());
    assert_eq!(ctx.staged_entries(), 0);
}

#[tokio::test]
async fn test_persist_failure_cleans_staging() {
    let ctx = TestContext::new();
    let project = ctx.project("shop").await;
    ctx.store.fail_on(store_ops::UPSERT_FUNCTION).await;

    let err = deploy::deploy_function(&ctx.state, &project, &function_archive("hello", "1.0.0"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Storage(_)));
    assert_eq!(ctx.staged_entries(), 0);
}

#[tokio::test]
async fn test_archive_without_manifest() {
    let ctx = TestContext::new();
    let project = ctx.project("shop").await;
    let archive = tar_gz(&[("main.py", "print('hi')")]);

    let err = deploy::deploy_function(&ctx.state, &project, &archive)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnsupportedRuntime(_)));
    assert!(ctx.runtime.build_contexts().await.is_empty());
    assert_eq!(ctx.staged_entries(), 0);
}

#[tokio::test]
async fn test_unknown_runtime_is_rejected() {
    let ctx = TestContext::new();
    let project = ctx.project("shop").await;
    let archive = tar_gz(&[(
        "package.json",
        r#"{"name":"hello","version":"1.0.0","main":"index.js","runtime":"deno"}"#,
    )]);

    let err = deploy::deploy_function(&ctx.state, &project, &archive)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnsupportedRuntime(_)));
    assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_corrupt_archive_is_rejected() {
    let ctx = TestContext::new();
    let project = ctx.project("shop").await;

    let err = deploy::deploy_function(&ctx.state, &project, b"not a tarball")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Archive(_)));
    assert_eq!(ctx.staged_entries(), 0);
}

#[tokio::test]
async fn test_invalid_version_is_rejected() {
    let ctx = TestContext::new();
    let project = ctx.project("shop").await;

    let err = deploy::deploy_function(&ctx.state, &project, &function_archive("hello", "1.0.0+build.5"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
    assert!(ctx.runtime.build_contexts().await.is_empty());
}
