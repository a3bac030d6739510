// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database provisioning and teardown.
//!
//! A database is a long-lived engine container on the project network with a
//! dedicated named volume. The container name doubles as the database host
//! for functions on the same network.
//!
//! Provisioning is a saga: if the container cannot be started or the record
//! cannot be persisted, the container and its volume are removed before the
//! error is reported. A failure of that compensation is attached to the
//! original error.

use serde::Deserialize;
use tracing::{info, warn};

use crate::container::{ContainerSpec, RestartPolicy, RuntimeError, VolumeMount};
use crate::deploy::is_valid_image_tag;
use crate::error::{Error, Result};
use crate::model::{Database, DbType, NewDatabase, Project};
use crate::naming::{
    PASSWORD_BYTES, USERNAME_LENGTH, USERNAME_PREFIX, database_container_name, generate_password,
    generate_username, to_snake_case, volume_name,
};
use crate::state::ControlPlaneState;

/// Body of a provision request.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionRequest {
    /// Engine type, e.g. `postgres`.
    #[serde(rename = "type")]
    pub db_type: String,
    /// Requested name; normalized to snake case.
    pub name: String,
    /// Engine image version; `latest` when missing or empty.
    #[serde(default)]
    pub version: Option<String>,
}

/// Provision a database in `project`.
///
/// Once validated, the request runs as a detached task: a caller that goes
/// away mid-provisioning cannot skip the compensation of a failed step.
pub async fn provision_database(
    state: &ControlPlaneState,
    project: &Project,
    request: &ProvisionRequest,
) -> Result<Database> {
    let db_type: DbType = request.db_type.parse().map_err(Error::UnsupportedType)?;

    let name = to_snake_case(request.name.trim());
    if name.is_empty() {
        return Err(Error::Validation("database name is required".to_string()));
    }

    let version = request
        .version
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(version) = version
        && !is_valid_image_tag(version)
    {
        return Err(Error::Validation(format!(
            "'{}' is not a valid image version",
            version
        )));
    }
    let image = db_type.image_ref(version);

    let state = state.clone();
    let project = project.clone();
    tokio::spawn(async move { provision(&state, &project, db_type, name, image).await }).await?
}

async fn provision(
    state: &ControlPlaneState,
    project: &Project,
    db_type: DbType,
    name: String,
    image: String,
) -> Result<Database> {
    if state.store.database_exists(project.id, &name).await? {
        return Err(Error::Conflict(format!(
            "database '{}' already exists in project '{}'",
            name, project.name
        )));
    }

    state.runtime.pull_image(&image).await?;

    state.runtime.inspect_network(&project.network_name).await?;

    let container_name = database_container_name();
    let volume = volume_name(&container_name);
    let username = generate_username(USERNAME_PREFIX, USERNAME_LENGTH);
    let password = generate_password(PASSWORD_BYTES);

    state.runtime.create_volume(&volume).await?;

    let spec = ContainerSpec {
        name: container_name.clone(),
        image: image.clone(),
        env: db_type.container_env(&name, &username, &password),
        mounts: vec![VolumeMount {
            volume: volume.clone(),
            target: db_type.data_dir().to_string(),
        }],
        network: Some(project.network_name.clone()),
        port_bindings: Vec::new(),
        restart_policy: RestartPolicy::Always,
    };

    let started = async {
        state.runtime.create_container(&spec).await?;
        state.runtime.start_container(&container_name).await?;
        Ok::<(), Error>(())
    }
    .await;
    if let Err(e) = started {
        return Err(compensate(state, &container_name, &volume, e).await);
    }

    let new_database = NewDatabase {
        project_id: project.id,
        name,
        db_type,
        username,
        password,
        container_id: container_name.clone(),
        volume_name: volume.clone(),
        image_version: image,
    };

    match state.store.create_database(&new_database).await {
        Ok(database) => {
            info!(
                project_id = %project.id,
                database_id = %database.id,
                container_id = %database.container_id,
                image = %database.image_version,
                "Database provisioned"
            );
            Ok(database)
        }
        Err(e) => Err(compensate(state, &container_name, &volume, e.into()).await),
    }
}

/// Remove a half-provisioned container and its volume.
async fn compensate(
    state: &ControlPlaneState,
    container_name: &str,
    volume: &str,
    original: Error,
) -> Error {
    warn!(container_id = container_name, error = %original, "Rolling back database container");
    match remove_database_resources(state, container_name, volume).await {
        Ok(()) => original,
        Err(e) => original.with_compensation_failure(e),
    }
}

/// Stop the container, remove it with its volumes, then remove the named volume.
///
/// Objects that are already gone count as removed.
async fn remove_database_resources(
    state: &ControlPlaneState,
    container_name: &str,
    volume: &str,
) -> Result<()> {
    tolerate_missing(
        state.runtime.stop_container(container_name).await,
        "container",
        container_name,
    )?;
    tolerate_missing(
        state
            .runtime
            .remove_container(container_name, true, true)
            .await,
        "container",
        container_name,
    )?;
    tolerate_missing(
        state.runtime.remove_volume(volume).await,
        "volume",
        volume,
    )
}

pub(crate) fn tolerate_missing(
    result: std::result::Result<(), RuntimeError>,
    kind: &str,
    name: &str,
) -> Result<()> {
    match result {
        Err(e) if !e.is_not_found() => Err(Error::Cleanup {
            resource: format!("{} {}", kind, name),
            source: e,
        }),
        _ => Ok(()),
    }
}

/// Tear down a database: stop, remove with volumes, remove the volume, delete the record.
///
/// The record survives any runtime failure so the teardown can be retried.
pub async fn teardown_database(
    state: &ControlPlaneState,
    project: &Project,
    database_id: uuid::Uuid,
) -> Result<Database> {
    let database = state
        .store
        .find_database(project.id, database_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("database {}", database_id)))?;

    remove_database_resources(state, &database.container_id, &database.volume_name).await?;
    state.store.delete_database(database.id).await?;

    info!(
        project_id = %project.id,
        database_id = %database.id,
        container_id = %database.container_id,
        "Database torn down"
    );
    Ok(database)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provision_request_shape() {
        let request: ProvisionRequest =
            serde_json::from_str(r#"{"type":"postgres","name":"Orders DB"}"#).unwrap();
        assert_eq!(request.db_type, "postgres");
        assert_eq!(request.name, "Orders DB");
        assert!(request.version.is_none());

        let request: ProvisionRequest =
            serde_json::from_str(r#"{"type":"postgres","name":"orders","version":"16"}"#)
                .unwrap();
        assert_eq!(request.version.as_deref(), Some("16"));
    }

    #[test]
    fn test_tolerate_missing() {
        assert!(
            tolerate_missing(
                Err(RuntimeError::NotFound {
                    kind: "volume",
                    name: "vol_x".into()
                }),
                "volume",
                "vol_x"
            )
            .is_ok()
        );

        let err = tolerate_missing(
            Err(RuntimeError::Timeout {
                op: "remove volume",
            }),
            "volume",
            "vol_x",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Cleanup { ref resource, .. } if resource == "volume vol_x"));
    }
}
