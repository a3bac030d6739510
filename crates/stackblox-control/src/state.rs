// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared state handed to every control-plane operation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::container::ContainerRuntime;
use crate::executor::{ReadinessPolicy, UnhealthyPolicy};
use crate::persistence::Store;
use crate::teardown::{DEFAULT_CONCURRENCY, TeardownQueue};

/// Default bound on a forwarded function request.
pub const DEFAULT_PROXY_TIMEOUT: Duration = Duration::from_secs(30);

/// Store, container runtime and policies shared by all operations.
///
/// Cheap to clone; request handlers hold it behind an `Arc`.
#[derive(Clone)]
pub struct ControlPlaneState {
    /// Metadata store.
    pub store: Arc<dyn Store>,
    /// Container runtime.
    pub runtime: Arc<dyn ContainerRuntime>,
    /// Where uploads are staged.
    pub uploads_dir: PathBuf,
    /// Where uploads are extracted.
    pub extractions_dir: PathBuf,
    /// Host interface function containers publish on.
    pub container_host: String,
    /// Readiness probe schedule.
    pub readiness: ReadinessPolicy,
    /// Fate of containers that never become ready.
    pub unhealthy_policy: UnhealthyPolicy,
    /// Client for probes and forwarded requests.
    pub http_client: reqwest::Client,
    /// Background teardown of function containers.
    pub teardown: TeardownQueue,
}

impl ControlPlaneState {
    /// Create state with default policies.
    ///
    /// Spawns the teardown worker, so this must be called inside a Tokio runtime.
    pub fn new(store: Arc<dyn Store>, runtime: Arc<dyn ContainerRuntime>) -> Self {
        let teardown = TeardownQueue::spawn(runtime.clone(), DEFAULT_CONCURRENCY);
        Self {
            store,
            runtime,
            uploads_dir: PathBuf::from(".data/uploads"),
            extractions_dir: PathBuf::from(".data/extractions"),
            container_host: "127.0.0.1".to_string(),
            readiness: ReadinessPolicy::default(),
            unhealthy_policy: UnhealthyPolicy::default(),
            http_client: build_client(DEFAULT_PROXY_TIMEOUT),
            teardown,
        }
    }

    /// Set the staging directories for deploys.
    pub fn with_staging_dirs(
        mut self,
        uploads_dir: impl Into<PathBuf>,
        extractions_dir: impl Into<PathBuf>,
    ) -> Self {
        self.uploads_dir = uploads_dir.into();
        self.extractions_dir = extractions_dir.into();
        self
    }

    /// Set the host interface function ports are published on.
    pub fn with_container_host(mut self, host: impl Into<String>) -> Self {
        self.container_host = host.into();
        self
    }

    /// Set the readiness probe schedule.
    pub fn with_readiness(mut self, readiness: ReadinessPolicy) -> Self {
        self.readiness = readiness;
        self
    }

    /// Set what happens to containers that never become ready.
    pub fn with_unhealthy_policy(mut self, policy: UnhealthyPolicy) -> Self {
        self.unhealthy_policy = policy;
        self
    }

    /// Bound forwarded requests by `timeout`.
    pub fn with_proxy_timeout(mut self, timeout: Duration) -> Self {
        self.http_client = build_client(timeout);
        self
    }

    /// Replace the teardown worker with one running `concurrency` jobs at once.
    pub fn with_teardown_concurrency(mut self, concurrency: usize) -> Self {
        self.teardown = TeardownQueue::spawn(self.runtime.clone(), concurrency);
        self
    }
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
