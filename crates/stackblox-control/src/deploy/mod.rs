// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Function deploy pipeline.
//!
//! An uploaded archive goes through a fixed sequence of steps:
//!
//! 1. stage the upload under a fresh UUID-derived file name
//! 2. extract it into a fresh directory
//! 3. read the manifest at the extraction root and derive slug and runtime
//! 4. attach the owning project
//! 5. render the Dockerfile for the runtime
//! 6. render the entrypoint shim for the declared entry module
//! 7. build the image tagged `{slug}:{version}` and `{slug}:latest`
//! 8. upsert the function row on `(slug, version, project_id)`
//!
//! Any failure aborts the remaining steps. The staged upload and the
//! extraction directory are owned by a [`DeployWorkspace`] and removed when it
//! drops, on every exit path.

pub mod archive;
pub mod templates;

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{Function, Language, Manifest, NewFunction, Project};
use crate::naming::to_kebab_case;
use crate::state::ControlPlaneState;

/// Manifest files that identify a runtime, in lookup order.
const MANIFESTS: &[(&str, Language)] = &[("package.json", Language::NodeJs)];

/// Staged upload plus extraction directory of one deploy.
///
/// Both paths are removed when the workspace drops.
pub struct DeployWorkspace {
    upload_path: PathBuf,
    extraction_dir: PathBuf,
}

impl DeployWorkspace {
    /// Reserve fresh paths for a deploy.
    pub fn new(uploads_dir: &Path, extractions_dir: &Path) -> Self {
        let staging_id = Uuid::new_v4();
        Self {
            upload_path: uploads_dir.join(format!("{}.tar.gz", staging_id)),
            extraction_dir: extractions_dir.join(staging_id.to_string()),
        }
    }

    /// Path the upload is staged at.
    pub fn upload_path(&self) -> &Path {
        &self.upload_path
    }

    /// Directory the upload is extracted into.
    pub fn extraction_dir(&self) -> &Path {
        &self.extraction_dir
    }
}

impl Drop for DeployWorkspace {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.upload_path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.upload_path.display(), error = %e, "Failed to remove staged upload");
        }
        if let Err(e) = std::fs::remove_dir_all(&self.extraction_dir)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.extraction_dir.display(), error = %e, "Failed to remove extraction directory");
        }
    }
}

/// Whether `tag` is usable as an image tag.
pub fn is_valid_image_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag.len() <= 128
        && !tag.starts_with(['.', '-'])
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Entry module must stay inside the build context.
fn is_valid_entry(main: &str) -> bool {
    let path = Path::new(main);
    !main.trim().is_empty()
        && path.is_relative()
        && path
            .components()
            .all(|c| !matches!(c, std::path::Component::ParentDir))
}

/// Read and validate the manifest at the extraction root.
///
/// The runtime is the manifest's explicit `runtime` field when present,
/// otherwise it is inferred from which manifest file exists.
pub async fn read_manifest(dir: &Path) -> Result<(Manifest, Language)> {
    for (file_name, inferred) in MANIFESTS {
        let path = dir.join(file_name);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };

        let manifest: Manifest = serde_json::from_slice(&raw)
            .map_err(|e| Error::Validation(format!("invalid {}: {}", file_name, e)))?;

        let language = match &manifest.runtime {
            Some(runtime) => runtime
                .parse::<Language>()
                .map_err(Error::UnsupportedRuntime)?,
            None => *inferred,
        };

        if manifest.name.trim().is_empty() {
            return Err(Error::Validation("manifest name is empty".to_string()));
        }
        if !is_valid_image_tag(&manifest.version) {
            return Err(Error::Validation(format!(
                "manifest version '{}' is not a valid image tag",
                manifest.version
            )));
        }
        if !is_valid_entry(&manifest.main) {
            return Err(Error::Validation(format!(
                "manifest main '{}' must be a relative path inside the archive",
                manifest.main
            )));
        }
        return Ok((manifest, language));
    }

    let expected: Vec<&str> = MANIFESTS.iter().map(|(name, _)| *name).collect();
    Err(Error::UnsupportedRuntime(format!(
        "no recognized manifest at archive root (expected one of: {})",
        expected.join(", ")
    )))
}

/// Deploy a function archive into `project`.
pub async fn deploy_function(
    state: &ControlPlaneState,
    project: &Project,
    archive_bytes: &[u8],
) -> Result<Function> {
    if archive_bytes.is_empty() {
        return Err(Error::Validation("function archive is empty".to_string()));
    }

    let workspace = DeployWorkspace::new(&state.uploads_dir, &state.extractions_dir);

    tokio::fs::create_dir_all(&state.uploads_dir).await?;
    tokio::fs::write(workspace.upload_path(), archive_bytes).await?;
    debug!(path = %workspace.upload_path().display(), bytes = archive_bytes.len(), "Staged upload");

    archive::extract_tar_gz(workspace.upload_path(), workspace.extraction_dir()).await?;

    let (manifest, language) = read_manifest(workspace.extraction_dir()).await?;
    let slug = to_kebab_case(&manifest.name);
    if !is_valid_slug(&slug) {
        return Err(Error::Validation(format!(
            "manifest name '{}' does not yield a valid slug",
            manifest.name
        )));
    }

    let new_function = NewFunction {
        project_id: project.id,
        name: manifest.name.clone(),
        description: manifest.description.clone(),
        slug,
        version: manifest.version.clone(),
        language,
        main: manifest.main.clone(),
    };

    let template = templates::runtime_template(language);
    tokio::fs::write(
        workspace.extraction_dir().join("Dockerfile"),
        templates::dockerfile(&template),
    )
    .await?;
    tokio::fs::write(
        workspace.extraction_dir().join(template.entrypoint),
        templates::entrypoint(language, &new_function.main),
    )
    .await?;

    let context = archive::pack_build_context(workspace.extraction_dir()).await?;
    let tags = vec![
        format!("{}:{}", new_function.slug, new_function.version),
        format!("{}:latest", new_function.slug),
    ];
    state.runtime.build_image(context, &tags).await?;

    let function = state.store.upsert_function(&new_function).await?;

    info!(
        project_id = %project.id,
        function_id = %function.id,
        slug = %function.slug,
        version = %function.version,
        "Function deployed"
    );

    Ok(function)
}
