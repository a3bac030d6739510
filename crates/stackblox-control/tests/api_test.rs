// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP API tests driven through the router without binding a socket.

mod common;

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{TestContext, function_archive};
use stackblox_control::server::build_router;

const BOUNDARY: &str = "stackbloxtestboundary";

fn router(ctx: &TestContext) -> Router {
    build_router(Arc::new(ctx.state.clone()))
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn multipart_request(uri: &str, field: &str, archive: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"function.tar.gz\"\r\n",
            field
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/gzip\r\n\r\n");
    body.extend_from_slice(archive);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_ping() {
    let ctx = TestContext::new();
    let (status, body) = send(&router(&ctx), empty_request("GET", "/ping")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "pong"}));
}

#[tokio::test]
async fn test_project_crud() {
    let ctx = TestContext::new();
    let app = router(&ctx);

    let (status, body) = send(&app, json_request("POST", "/projects", json!({"name": "My Shop"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "project created");
    assert_eq!(body["data"]["name"], "my-shop");
    assert_eq!(body["data"]["networkName"], "net_my_shop");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, empty_request("GET", "/projects")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "1 projects found");

    let (status, body) = send(&app, empty_request("GET", &format!("/projects/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "record found");
    assert_eq!(body["data"]["name"], "my-shop");
    assert_eq!(body["data"]["functions"], json!([]));
    assert_eq!(body["data"]["databases"], json!([]));

    let (status, body) = send(
        &app,
        json_request("PUT", "/projects/my-shop", json!({"name": "Store Front"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "store-front");

    let (status, body) = send(&app, empty_request("DELETE", "/projects/store-front")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "project deleted");
    assert!(!ctx.runtime.has_network("net_my_shop").await);

    let (status, _) = send(&app, empty_request("GET", &format!("/projects/{}", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_error_envelope() {
    let ctx = TestContext::new();
    let app = router(&ctx);

    let (status, body) = send(&app, empty_request("GET", "/projects/missing")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("missing"));
    assert!(!body["help"].as_str().unwrap().is_empty());
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn test_duplicate_project_is_400() {
    let ctx = TestContext::new();
    let app = router(&ctx);
    ctx.project("shop").await;

    let (status, body) = send(&app, json_request("POST", "/projects", json!({"name": "shop"}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_malformed_body_is_400() {
    let ctx = TestContext::new();
    let app = router(&ctx);

    let request = Request::builder()
        .method("POST")
        .uri("/projects")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["help"].is_string());

    let (status, _) = send(&app, json_request("POST", "/projects", json!({"title": "x"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_deploy_and_list_functions() {
    let ctx = TestContext::new();
    let app = router(&ctx);
    ctx.project("shop").await;

    let (status, body) = send(
        &app,
        multipart_request(
            "/projects/shop/functions/deploy",
            "function",
            &function_archive("hello", "1.0.0"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "function deployed");
    assert_eq!(body["data"]["slug"], "hello");
    assert_eq!(body["data"]["version"], "1.0.0");

    let (status, body) = send(&app, empty_request("GET", "/projects/shop/functions")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "1 functions found");
}

#[tokio::test]
async fn test_deploy_without_archive_field() {
    let ctx = TestContext::new();
    let app = router(&ctx);
    ctx.project("shop").await;

    let (status, body) = send(
        &app,
        multipart_request(
            "/projects/shop/functions/deploy",
            "upload",
            &function_archive("hello", "1.0.0"),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("function"));
    assert!(ctx.runtime.build_contexts().await.is_empty());
}

#[tokio::test]
async fn test_provision_and_teardown_database() {
    let ctx = TestContext::new();
    let app = router(&ctx);
    ctx.project("shop").await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/projects/shop/databases/provision",
            json!({"type": "postgres", "name": "Orders", "version": "16"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "database provisioned");
    assert_eq!(body["data"]["name"], "orders");
    assert_eq!(body["data"]["type"], "postgres");
    assert!(body["data"].get("password").is_none());
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (_, body) = send(&app, empty_request("GET", "/projects/shop/databases")).await;
    assert_eq!(body["message"], "1 databases found");

    let (status, body) = send(
        &app,
        empty_request("DELETE", &format!("/projects/shop/databases/{}/teardown", id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "database torn down");
    assert_eq!(ctx.runtime.volume_count().await, 0);
}

#[tokio::test]
async fn test_unsupported_database_type_is_400() {
    let ctx = TestContext::new();
    let app = router(&ctx);
    ctx.project("shop").await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/projects/shop/databases/provision",
            json!({"type": "mongodb", "name": "docs"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["help"].as_str().unwrap().contains("postgres"));
}

#[tokio::test]
async fn test_teardown_with_invalid_id_is_400() {
    let ctx = TestContext::new();
    let app = router(&ctx);
    ctx.project("shop").await;

    let (status, _) = send(
        &app,
        empty_request("DELETE", "/projects/shop/databases/not-a-uuid/teardown"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_execute_through_api() {
    let ctx = TestContext::new();
    let app = router(&ctx);
    let project = ctx.project("shop").await;
    stackblox_control::deploy::deploy_function(
        &ctx.state,
        &project,
        &function_archive("hello", "1.0.0"),
    )
    .await
    .unwrap();

    let server = MockServer::start().await;
    ctx.runtime.set_host_port(server.address().port()).await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/orders/42"))
        .and(query_param("expand", "items"))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("x-handled-by", "hello")
                .set_body_json(json!({"accepted": true})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri("/projects/shop/functions/execute/hello/orders/42?expand=items")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response.headers().get("x-handled-by").unwrap(), "hello");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({"accepted": true}));

    ctx.state.teardown.wait_idle().await;
    assert!(ctx.runtime.containers().await.is_empty());
}

#[tokio::test]
async fn test_execute_unknown_function_is_404() {
    let ctx = TestContext::new();
    let app = router(&ctx);
    ctx.project("shop").await;

    let (status, body) = send(
        &app,
        empty_request("GET", "/projects/shop/functions/execute/missing"),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("missing"));
}
