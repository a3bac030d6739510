// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP server.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/ping` | Liveness |
//! | GET | `/projects` | List projects |
//! | POST | `/projects` | Create a project and its network |
//! | GET | `/projects/{project}` | Project with functions and databases |
//! | PUT | `/projects/{project}` | Rename a project |
//! | DELETE | `/projects/{project}` | Tear down a project |
//! | GET | `/projects/{project}/functions` | List function versions |
//! | POST | `/projects/{project}/functions/deploy` | Deploy an archive (multipart field `function`) |
//! | ANY | `/projects/{project}/functions/execute/{slug}[/{*path}]` | Invoke a function |
//! | GET | `/projects/{project}/databases` | List databases |
//! | POST | `/projects/{project}/databases/provision` | Provision a database |
//! | DELETE | `/projects/{project}/databases/{id}/teardown` | Tear down a database |
//!
//! `{project}` is a project UUID or name.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{any, delete, get, post};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;
use crate::state::ControlPlaneState;

/// Largest accepted function archive.
pub const MAX_ARCHIVE_BYTES: usize = 64 * 1024 * 1024;

/// Build the API router.
pub fn build_router(state: Arc<ControlPlaneState>) -> Router {
    let project_routes = Router::new()
        .route("/functions", get(handlers::list_functions))
        .route(
            "/functions/deploy",
            post(handlers::deploy_function).layer(DefaultBodyLimit::max(MAX_ARCHIVE_BYTES)),
        )
        .route("/functions/execute/{slug}", any(handlers::execute_function))
        .route(
            "/functions/execute/{slug}/{*path}",
            any(handlers::execute_function_path),
        )
        .route("/databases", get(handlers::list_databases))
        .route("/databases/provision", post(handlers::provision_database))
        .route(
            "/databases/{database_id}/teardown",
            delete(handlers::teardown_database),
        );

    Router::new()
        .route("/ping", get(handlers::ping))
        .route(
            "/projects",
            get(handlers::list_projects).post(handlers::create_project),
        )
        .route(
            "/projects/{project}",
            get(handlers::get_project)
                .put(handlers::update_project)
                .delete(handlers::delete_project),
        )
        .nest("/projects/{project}", project_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on an already bound listener until `shutdown` resolves.
pub async fn serve_http(
    listener: TcpListener,
    state: Arc<ControlPlaneState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    info!(addr = %listener.local_addr()?, "HTTP server listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server stopped");
    Ok(())
}
