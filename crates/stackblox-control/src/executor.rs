// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Function execution.
//!
//! Every invocation gets a dedicated container:
//!
//! 1. resolve the function by slug within the request's project
//! 2. pick the image tag from the caller's version hint (default `latest`)
//! 3. project sibling functions and databases into the environment
//! 4. create and start the container on the project network, publishing the
//!    function port on an OS-assigned host port, and read that port back
//! 5. poll the health endpoint on the schedule of a [`ReadinessPolicy`]
//! 6. forward the request and capture the response
//! 7. return the response to the caller
//! 8. hand the container to the [`TeardownQueue`](crate::teardown::TeardownQueue),
//!    also when the invocation is dropped before it finishes
//!
//! Readiness probes sleep first and check second. A container that never
//! answers is torn down or left in place according to [`UnhealthyPolicy`].

use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, Method, StatusCode, header};
use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::container::{ContainerSpec, PortBinding, RestartPolicy, RuntimeError};
use crate::deploy::is_valid_image_tag;
use crate::deploy::templates::{FUNCTION_PORT, HEALTH_PATH};
use crate::env_projection::project_snapshot;
use crate::error::{Error, Result};
use crate::model::ProjectSnapshot;
use crate::naming::function_container_name;
use crate::state::ControlPlaneState;
use crate::teardown::TeardownGuard;

/// Header carrying the caller's image version hint.
pub const IMAGE_VERSION_HEADER: &str = "x-image-version";

/// Tag used when the caller gives no version hint.
pub const DEFAULT_IMAGE_TAG: &str = "latest";

/// Readiness probe schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Sleep before each probe; one probe per entry.
    pub delays: Vec<Duration>,
    /// Bound on a single probe request.
    pub probe_timeout: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            delays: vec![
                Duration::from_millis(250),
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(3),
            ],
            probe_timeout: Duration::from_secs(1),
        }
    }
}

/// What to do with a container that never passed its readiness checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnhealthyPolicy {
    /// Tear it down like any other invocation container.
    #[default]
    Remove,
    /// Leave it running for inspection.
    Retain,
}

/// An invocation as received from the caller.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Request method.
    pub method: Method,
    /// Path and query forwarded to the container, starting with `/`.
    pub path_and_query: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Bytes,
}

impl ExecutionRequest {
    /// Image version hint from the request headers.
    pub fn image_version(&self) -> Option<&str> {
        self.headers
            .get(IMAGE_VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// The container's answer.
#[derive(Debug, Clone)]
pub struct ExecutionResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers safe to mirror back to the caller.
    pub headers: HeaderMap,
    /// JSON-decoded body, or the raw text when it is not JSON.
    pub body: Value,
}

/// Headers never forwarded in either direction.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_forwardable(name: &HeaderName) -> bool {
    !HOP_BY_HOP.contains(&name.as_str())
        && name != header::HOST
        && name != header::CONTENT_LENGTH
}

fn request_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        if is_forwardable(name) && name.as_str() != IMAGE_VERSION_HEADER {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// The body is always re-encoded as JSON, so its framing headers are dropped.
fn response_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        if is_forwardable(name) && name != header::CONTENT_TYPE {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Decode a response body: JSON when possible, raw text otherwise.
///
/// An empty body decodes to an empty string.
pub fn decode_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::String(String::new());
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// Poll `url` once per policy delay, sleeping before each probe.
///
/// Succeeds on the first `200 OK`.
pub async fn await_readiness(
    client: &reqwest::Client,
    url: &str,
    policy: &ReadinessPolicy,
    container: &str,
) -> Result<()> {
    for (attempt, delay) in policy.delays.iter().enumerate() {
        tokio::time::sleep(*delay).await;
        match client.get(url).timeout(policy.probe_timeout).send().await {
            Ok(response) if response.status() == StatusCode::OK => {
                debug!(container, attempt = attempt + 1, "Container is ready");
                return Ok(());
            }
            Ok(response) => {
                debug!(container, attempt = attempt + 1, status = %response.status(), "Container not ready");
            }
            Err(e) => {
                debug!(container, attempt = attempt + 1, error = %e, "Container not ready");
            }
        }
    }

    Err(Error::Unhealthy {
        container: container.to_string(),
        attempts: policy.delays.len(),
    })
}

/// Forward a request to `base_url` and capture the response.
pub async fn forward(
    client: &reqwest::Client,
    base_url: &str,
    request: &ExecutionRequest,
) -> Result<ExecutionResponse> {
    let path = if request.path_and_query.starts_with('/') {
        request.path_and_query.clone()
    } else {
        format!("/{}", request.path_and_query)
    };

    let response = client
        .request(request.method.clone(), format!("{}{}", base_url, path))
        .headers(request_headers(&request.headers))
        .body(request.body.clone())
        .send()
        .await
        .map_err(|e| Error::Proxy(e.to_string()))?;

    let status = response.status();
    let headers = response_headers(response.headers());
    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::Proxy(e.to_string()))?;

    Ok(ExecutionResponse {
        status,
        headers,
        body: decode_body(&bytes),
    })
}

/// Run one invocation of `slug` inside the project of `snapshot`.
pub async fn execute_function(
    state: &ControlPlaneState,
    snapshot: &ProjectSnapshot,
    slug: &str,
    request: ExecutionRequest,
) -> Result<ExecutionResponse> {
    let function = state
        .store
        .find_latest_function(snapshot.project.id, slug)
        .await?
        .ok_or_else(|| Error::NotFound(format!("function '{}'", slug)))?;

    let tag = request.image_version().unwrap_or(DEFAULT_IMAGE_TAG);
    if !is_valid_image_tag(tag) {
        return Err(Error::Validation(format!(
            "'{}' is not a valid image version",
            tag
        )));
    }

    let spec = ContainerSpec {
        name: function_container_name(),
        image: function.image_ref(tag),
        env: project_snapshot(snapshot),
        mounts: Vec::new(),
        network: Some(snapshot.project.network_name.clone()),
        port_bindings: vec![PortBinding {
            container_port: FUNCTION_PORT,
            host_ip: state.container_host.clone(),
            host_port: None,
        }],
        restart_policy: RestartPolicy::No,
    };

    let container_id = state.runtime.create_container(&spec).await?;
    info!(
        project_id = %snapshot.project.id,
        function = %function.slug,
        image = %spec.image,
        container_id = %container_id,
        "Function container created"
    );

    let guard = TeardownGuard::new(&state.teardown, container_id.clone());

    let result = match state.runtime.start_container(&container_id).await {
        Ok(()) => serve(state, &container_id, &request).await,
        Err(e) => Err(e.into()),
    };

    if let Err(Error::Unhealthy { .. }) = &result
        && state.unhealthy_policy == UnhealthyPolicy::Retain
    {
        warn!(container_id = %container_id, "Leaving unhealthy container in place");
        guard.disarm();
    }

    result
}

async fn serve(
    state: &ControlPlaneState,
    container_id: &str,
    request: &ExecutionRequest,
) -> Result<ExecutionResponse> {
    let info = state.runtime.inspect_container(container_id).await?;
    let host_port = info.host_port(FUNCTION_PORT).ok_or_else(|| {
        RuntimeError::Other(format!(
            "container {} has no host port for {}/tcp",
            container_id, FUNCTION_PORT
        ))
    })?;

    // A wildcard bind is reached through loopback.
    let host = match state.container_host.as_str() {
        "0.0.0.0" | "" => "127.0.0.1",
        other => other,
    };
    let base_url = format!("http://{}:{}", host, host_port);

    await_readiness(
        &state.http_client,
        &format!("{}{}", base_url, HEALTH_PATH),
        &state.readiness,
        container_id,
    )
    .await?;

    let response = forward(&state.http_client, &base_url, request).await?;
    debug!(container_id, status = %response.status, "Function responded");
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_default_schedule() {
        let policy = ReadinessPolicy::default();
        assert_eq!(
            policy.delays,
            vec![
                Duration::from_millis(250),
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(3000),
            ]
        );
        assert_eq!(UnhealthyPolicy::default(), UnhealthyPolicy::Remove);
    }

    #[test]
    fn test_decode_body() {
        assert_eq!(decode_body(b""), Value::String(String::new()));
        assert_eq!(
            decode_body(br#"{"ok":true}"#),
            serde_json::json!({"ok": true})
        );
        assert_eq!(decode_body(b"plain text"), Value::String("plain text".into()));
        assert_eq!(decode_body(b"42"), serde_json::json!(42));
    }

    #[test]
    fn test_header_filtering() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("control:8080"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("10"));
        headers.insert(IMAGE_VERSION_HEADER, HeaderValue::from_static("1.0.0"));
        headers.insert("x-trace-id", HeaderValue::from_static("abc"));
        headers.append("accept", HeaderValue::from_static("text/plain"));
        headers.append("accept", HeaderValue::from_static("application/json"));

        let forwarded = request_headers(&headers);
        assert!(forwarded.get(header::HOST).is_none());
        assert!(forwarded.get(header::CONNECTION).is_none());
        assert!(forwarded.get(header::CONTENT_LENGTH).is_none());
        assert!(forwarded.get(IMAGE_VERSION_HEADER).is_none());
        assert_eq!(forwarded.get("x-trace-id").unwrap(), "abc");
        assert_eq!(forwarded.get_all("accept").iter().count(), 2);
    }

    #[test]
    fn test_image_version_hint() {
        let mut request = ExecutionRequest {
            method: Method::GET,
            path_and_query: "/".to_string(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        };
        assert_eq!(request.image_version(), None);
        request
            .headers
            .insert(IMAGE_VERSION_HEADER, HeaderValue::from_static(" 2.1.0 "));
        assert_eq!(request.image_version(), Some("2.1.0"));
    }
}
