// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for stackblox-control integration tests.
//!
//! Provides a [`TestContext`] wired to the mock container runtime and the
//! in-memory store, plus archive fixtures.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;

use stackblox_control::container::MockRuntime;
use stackblox_control::executor::ReadinessPolicy;
use stackblox_control::model::Project;
use stackblox_control::persistence::MemoryStore;
use stackblox_control::projects;
use stackblox_control::state::ControlPlaneState;

/// Test context holding the mock runtime, the memory store and the staging dirs.
pub struct TestContext {
    pub runtime: MockRuntime,
    pub store: MemoryStore,
    pub state: ControlPlaneState,
    pub uploads_dir: PathBuf,
    pub extractions_dir: PathBuf,
    _temp_dir: TempDir,
}

impl TestContext {
    /// Create a new test context with a fast readiness schedule.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let uploads_dir = temp_dir.path().join("uploads");
        let extractions_dir = temp_dir.path().join("extractions");

        let runtime = MockRuntime::new();
        let store = MemoryStore::new();
        let state = ControlPlaneState::new(Arc::new(store.clone()), Arc::new(runtime.clone()))
            .with_staging_dirs(&uploads_dir, &extractions_dir)
            .with_readiness(fast_readiness());

        Self {
            runtime,
            store,
            state,
            uploads_dir,
            extractions_dir,
            _temp_dir: temp_dir,
        }
    }

    /// Create a project through the lifecycle manager.
    pub async fn project(&self, name: &str) -> Project {
        projects::create_project(&self.state, name)
            .await
            .expect("Failed to create project")
    }

    /// Entries left in both staging directories.
    pub fn staged_entries(&self) -> usize {
        count_entries(&self.uploads_dir) + count_entries(&self.extractions_dir)
    }
}

/// The default schedule scaled down by 50x.
pub fn fast_readiness() -> ReadinessPolicy {
    ReadinessPolicy {
        delays: vec![
            Duration::from_millis(5),
            Duration::from_millis(10),
            Duration::from_millis(20),
            Duration::from_millis(60),
        ],
        probe_timeout: Duration::from_millis(500),
    }
}

fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| entries.count())
        .unwrap_or(0)
}

/// Build a gzip-compressed tar archive from `(path, content)` pairs.
pub fn tar_gz(files: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, content.as_bytes())
            .expect("Failed to append archive entry");
    }
    builder
        .into_inner()
        .expect("Failed to finish tar")
        .finish()
        .expect("Failed to finish gzip")
}

/// A node function archive with the given manifest name and version.
pub fn function_archive(name: &str, version: &str) -> Vec<u8> {
    let manifest = serde_json::json!({
        "name": name,
        "description": "test function",
        "version": version,
        "main": "index.js",
    })
    .to_string();
    tar_gz(&[
        ("package.json", &manifest),
        (
            "index.js",
            "module.exports = async (req) => ({ status: 200, body: { ok: true } });",
        ),
    ])
}
