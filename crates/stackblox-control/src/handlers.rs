// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP handlers.
//!
//! Every handler resolves the addressed project fresh from the store and
//! passes the snapshot explicitly to the operation. Successes are wrapped as
//! `{"message", "data"}`; errors are rendered as `{"error", "help"}` with the
//! status from [`Error::status_code`].

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::databases::{self, ProvisionRequest};
use crate::deploy;
use crate::error::{Error, Result};
use crate::executor::{self, ExecutionRequest};
use crate::projects;
use crate::state::ControlPlaneState;

/// Multipart field carrying the function archive.
pub const ARCHIVE_FIELD: &str = "function";

/// Success envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// What happened.
    pub message: String,
    /// Payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            message: message.into(),
            data: Some(data),
        })
    }
}

/// Error envelope.
#[derive(Debug, Serialize)]
pub struct ApiError {
    /// The error message.
    pub error: String,
    /// What the caller can do about it.
    pub help: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        let body = ApiError {
            error: self.to_string(),
            help: self.hint().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Body of project create and rename requests.
#[derive(Debug, Deserialize)]
pub struct ProjectRequest {
    /// Human project name.
    pub name: String,
}

fn json_body<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(value)| value)
        .map_err(|e| Error::Validation(e.body_text()))
}

/// GET /ping
pub async fn ping() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "pong" }))
}

// ---- Projects ----

/// GET /projects
pub async fn list_projects(State(state): State<Arc<ControlPlaneState>>) -> Result<Response> {
    let projects = projects::list_projects(&state).await?;
    Ok(ApiResponse::ok(format!("{} projects found", projects.len()), projects).into_response())
}

/// POST /projects
pub async fn create_project(
    State(state): State<Arc<ControlPlaneState>>,
    body: std::result::Result<Json<ProjectRequest>, JsonRejection>,
) -> Result<Response> {
    let request = json_body(body)?;
    let project = projects::create_project(&state, &request.name).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::ok("project created", project),
    )
        .into_response())
}

/// GET /projects/{project}
pub async fn get_project(
    State(state): State<Arc<ControlPlaneState>>,
    Path(project): Path<String>,
) -> Result<Response> {
    let snapshot = projects::resolve_project(&state, &project).await?;
    Ok(ApiResponse::ok("record found", snapshot).into_response())
}

/// PUT /projects/{project}
pub async fn update_project(
    State(state): State<Arc<ControlPlaneState>>,
    Path(project): Path<String>,
    body: std::result::Result<Json<ProjectRequest>, JsonRejection>,
) -> Result<Response> {
    let request = json_body(body)?;
    let snapshot = projects::resolve_project(&state, &project).await?;
    let renamed = projects::rename_project(&state, &snapshot.project, &request.name).await?;
    Ok(ApiResponse::ok("project updated", renamed).into_response())
}

/// DELETE /projects/{project}
pub async fn delete_project(
    State(state): State<Arc<ControlPlaneState>>,
    Path(project): Path<String>,
) -> Result<Response> {
    let snapshot = projects::resolve_project(&state, &project).await?;
    projects::delete_project(&state, &snapshot).await?;
    Ok(ApiResponse::ok("project deleted", snapshot.project).into_response())
}

// ---- Functions ----

/// GET /projects/{project}/functions
pub async fn list_functions(
    State(state): State<Arc<ControlPlaneState>>,
    Path(project): Path<String>,
) -> Result<Response> {
    let snapshot = projects::resolve_project(&state, &project).await?;
    Ok(ApiResponse::ok(
        format!("{} functions found", snapshot.functions.len()),
        snapshot.functions,
    )
    .into_response())
}

/// POST /projects/{project}/functions/deploy
pub async fn deploy_function(
    State(state): State<Arc<ControlPlaneState>>,
    Path(project): Path<String>,
    mut multipart: Multipart,
) -> Result<Response> {
    let snapshot = projects::resolve_project(&state, &project).await?;

    let mut archive = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Validation(e.body_text()))?
    {
        if field.name() == Some(ARCHIVE_FIELD) {
            archive = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| Error::Validation(e.body_text()))?,
            );
            break;
        }
    }
    let archive = archive.ok_or_else(|| {
        Error::Validation(format!("multipart field '{}' is required", ARCHIVE_FIELD))
    })?;

    let function = deploy::deploy_function(&state, &snapshot.project, &archive).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::ok("function deployed", function),
    )
        .into_response())
}

/// ANY /projects/{project}/functions/execute/{slug}
pub async fn execute_function(
    State(state): State<Arc<ControlPlaneState>>,
    Path((project, slug)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    execute(&state, &project, &slug, "", method, &uri, headers, body).await
}

/// ANY /projects/{project}/functions/execute/{slug}/{*path}
pub async fn execute_function_path(
    State(state): State<Arc<ControlPlaneState>>,
    Path((project, slug, path)): Path<(String, String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    execute(&state, &project, &slug, &path, method, &uri, headers, body).await
}

#[allow(clippy::too_many_arguments)]
async fn execute(
    state: &ControlPlaneState,
    project: &str,
    slug: &str,
    path: &str,
    method: Method,
    uri: &Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let snapshot = projects::resolve_project(state, project).await?;

    let mut path_and_query = format!("/{}", path.trim_start_matches('/'));
    if let Some(query) = uri.query() {
        path_and_query.push('?');
        path_and_query.push_str(query);
    }

    let request = ExecutionRequest {
        method,
        path_and_query,
        headers,
        body,
    };
    let response = executor::execute_function(state, &snapshot, slug, request).await?;

    let mut out = (response.status, Json(response.body)).into_response();
    out.headers_mut().extend(response.headers);
    Ok(out)
}

// ---- Databases ----

/// GET /projects/{project}/databases
pub async fn list_databases(
    State(state): State<Arc<ControlPlaneState>>,
    Path(project): Path<String>,
) -> Result<Response> {
    let snapshot = projects::resolve_project(&state, &project).await?;
    Ok(ApiResponse::ok(
        format!("{} databases found", snapshot.databases.len()),
        snapshot.databases,
    )
    .into_response())
}

/// POST /projects/{project}/databases/provision
pub async fn provision_database(
    State(state): State<Arc<ControlPlaneState>>,
    Path(project): Path<String>,
    body: std::result::Result<Json<ProvisionRequest>, JsonRejection>,
) -> Result<Response> {
    let request = json_body(body)?;
    let snapshot = projects::resolve_project(&state, &project).await?;
    let database = databases::provision_database(&state, &snapshot.project, &request).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::ok("database provisioned", database),
    )
        .into_response())
}

/// DELETE /projects/{project}/databases/{database_id}/teardown
pub async fn teardown_database(
    State(state): State<Arc<ControlPlaneState>>,
    Path((project, database_id)): Path<(String, String)>,
) -> Result<Response> {
    let database_id = Uuid::parse_str(&database_id).map_err(|_| {
        Error::Validation(format!("'{}' is not a valid database ID", database_id))
    })?;
    let snapshot = projects::resolve_project(&state, &project).await?;
    let database = databases::teardown_database(&state, &snapshot.project, database_id).await?;
    Ok(ApiResponse::ok("database torn down", database).into_response())
}
