// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Project and network lifecycle.
//!
//! A project owns one bridge network named after it. Deleting a project is an
//! ordered teardown: function images, then database containers and volumes,
//! then the network, then the record. The first failure stops the teardown and
//! leaves the record in place so the deletion can be retried.

use std::collections::BTreeSet;

use tracing::{info, warn};
use uuid::Uuid;

use crate::container::RuntimeError;
use crate::databases::tolerate_missing;
use crate::error::{Error, Result};
use crate::model::{NewProject, Project, ProjectSnapshot};
use crate::naming::{network_name, to_kebab_case};
use crate::state::ControlPlaneState;

fn normalize_name(name: &str) -> Result<String> {
    let normalized = to_kebab_case(name.trim());
    if normalized.is_empty() {
        return Err(Error::Validation("project name is required".to_string()));
    }
    Ok(normalized)
}

/// Create a project and its network.
///
/// The network and record are created in a detached task, so a dropped
/// request still either stores the project or removes the network.
pub async fn create_project(state: &ControlPlaneState, name: &str) -> Result<Project> {
    let name = normalize_name(name)?;
    let state = state.clone();
    tokio::spawn(async move { create_network_and_record(&state, name).await }).await?
}

async fn create_network_and_record(state: &ControlPlaneState, name: String) -> Result<Project> {
    let network = network_name(&name);

    if state.store.find_project_by_name(&name).await?.is_some() {
        return Err(Error::Conflict(format!("project '{}' already exists", name)));
    }

    match state.runtime.create_network(&network).await {
        Ok(_) => {}
        Err(RuntimeError::AlreadyExists { .. }) => {
            return Err(Error::Conflict(format!(
                "network '{}' already exists",
                network
            )));
        }
        Err(e) => return Err(e.into()),
    }

    let new_project = NewProject {
        name,
        network_name: network.clone(),
    };
    match state.store.create_project(&new_project).await {
        Ok(project) => {
            info!(project_id = %project.id, network = %project.network_name, "Project created");
            Ok(project)
        }
        Err(e) => {
            let original: Error = e.into();
            warn!(network = %network, error = %original, "Rolling back project network");
            match state.runtime.remove_network(&network).await {
                Ok(()) => Err(original),
                Err(e) => Err(original.with_compensation_failure(e)),
            }
        }
    }
}

/// Resolve a project by UUID or name and load its functions and databases.
pub async fn resolve_project(state: &ControlPlaneState, name_or_id: &str) -> Result<ProjectSnapshot> {
    let project = match Uuid::parse_str(name_or_id) {
        Ok(id) => state.store.find_project(id).await?,
        Err(_) => {
            state
                .store
                .find_project_by_name(&to_kebab_case(name_or_id.trim()))
                .await?
        }
    };

    let project =
        project.ok_or_else(|| Error::NotFound(format!("project '{}'", name_or_id)))?;
    Ok(state.store.load_snapshot(project).await?)
}

/// All live projects.
pub async fn list_projects(state: &ControlPlaneState) -> Result<Vec<Project>> {
    Ok(state.store.list_projects().await?)
}

/// Rename a project. The network keeps its original name.
pub async fn rename_project(
    state: &ControlPlaneState,
    project: &Project,
    name: &str,
) -> Result<Project> {
    let name = normalize_name(name)?;
    let renamed = state.store.rename_project(project.id, &name).await?;
    info!(project_id = %renamed.id, name = %renamed.name, "Project renamed");
    Ok(renamed)
}

/// Tear down everything a project owns, then delete its record.
pub async fn delete_project(state: &ControlPlaneState, snapshot: &ProjectSnapshot) -> Result<()> {
    let project = &snapshot.project;

    let mut images: Vec<String> = Vec::new();
    let mut slugs = BTreeSet::new();
    for function in &snapshot.functions {
        images.push(function.image_ref(&function.version));
        slugs.insert(function.slug.as_str());
    }
    images.extend(slugs.into_iter().map(|slug| format!("{}:latest", slug)));

    for image in &images {
        tolerate_missing(
            state.runtime.remove_image(image, true, true).await,
            "image",
            image,
        )?;
    }

    for database in &snapshot.databases {
        tolerate_missing(
            state.runtime.stop_container(&database.container_id).await,
            "container",
            &database.container_id,
        )?;
        tolerate_missing(
            state
                .runtime
                .remove_container(&database.container_id, true, true)
                .await,
            "container",
            &database.container_id,
        )?;
        tolerate_missing(
            state.runtime.remove_volume(&database.volume_name).await,
            "volume",
            &database.volume_name,
        )?;
    }

    tolerate_missing(
        state.runtime.remove_network(&project.network_name).await,
        "network",
        &project.network_name,
    )?;

    state.store.delete_project(project.id).await?;

    info!(
        project_id = %project.id,
        images = images.len(),
        databases = snapshot.databases.len(),
        "Project deleted"
    );
    Ok(())
}
