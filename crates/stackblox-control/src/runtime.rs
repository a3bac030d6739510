// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for stackblox-control.
//!
//! [`ControlPlaneRuntime`] runs the HTTP API and the staging sweeper inside an
//! existing tokio application.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stackblox_control::container::{DockerCli, DockerCliConfig};
//! use stackblox_control::persistence::PostgresStore;
//! use stackblox_control::runtime::ControlPlaneRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = sqlx::PgPool::connect("postgres://...").await?;
//!
//!     let runtime = ControlPlaneRuntime::builder()
//!         .store(Arc::new(PostgresStore::new(pool)))
//!         .container_runtime(Arc::new(DockerCli::new(DockerCliConfig::default())))
//!         .bind_addr("0.0.0.0:8080".parse()?)
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // ... run your application ...
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::container::ContainerRuntime;
use crate::executor::{ReadinessPolicy, UnhealthyPolicy};
use crate::persistence::Store;
use crate::server::serve_http;
use crate::staging_sweeper::{StagingSweeper, StagingSweeperConfig};
use crate::state::{ControlPlaneState, DEFAULT_PROXY_TIMEOUT};
use crate::teardown::DEFAULT_CONCURRENCY;

/// Builder for creating a [`ControlPlaneRuntime`].
pub struct ControlPlaneRuntimeBuilder {
    store: Option<Arc<dyn Store>>,
    container_runtime: Option<Arc<dyn ContainerRuntime>>,
    bind_addr: SocketAddr,
    uploads_dir: PathBuf,
    extractions_dir: PathBuf,
    container_host: String,
    readiness: ReadinessPolicy,
    unhealthy_policy: UnhealthyPolicy,
    proxy_timeout: Duration,
    teardown_concurrency: usize,
    staging_sweep_interval: Duration,
    staging_max_age: Duration,
}

impl Default for ControlPlaneRuntimeBuilder {
    fn default() -> Self {
        let sweeper = StagingSweeperConfig::default();
        Self {
            store: None,
            container_runtime: None,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            uploads_dir: sweeper.uploads_dir,
            extractions_dir: sweeper.extractions_dir,
            container_host: "127.0.0.1".to_string(),
            readiness: ReadinessPolicy::default(),
            unhealthy_policy: UnhealthyPolicy::default(),
            proxy_timeout: DEFAULT_PROXY_TIMEOUT,
            teardown_concurrency: DEFAULT_CONCURRENCY,
            staging_sweep_interval: sweeper.poll_interval,
            staging_max_age: sweeper.max_age,
        }
    }
}

impl ControlPlaneRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the metadata store (required).
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the container runtime (required).
    pub fn container_runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.container_runtime = Some(runtime);
        self
    }

    /// Set the HTTP bind address.
    ///
    /// Default: `0.0.0.0:8080`
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the deploy staging directories.
    ///
    /// Default: `.data/uploads` and `.data/extractions`
    pub fn staging_dirs(
        mut self,
        uploads_dir: impl Into<PathBuf>,
        extractions_dir: impl Into<PathBuf>,
    ) -> Self {
        self.uploads_dir = uploads_dir.into();
        self.extractions_dir = extractions_dir.into();
        self
    }

    /// Set the host interface function containers publish on.
    ///
    /// Default: `127.0.0.1`
    pub fn container_host(mut self, host: impl Into<String>) -> Self {
        self.container_host = host.into();
        self
    }

    /// Set the readiness probe schedule.
    pub fn readiness(mut self, readiness: ReadinessPolicy) -> Self {
        self.readiness = readiness;
        self
    }

    /// Set what happens to containers that never become ready.
    ///
    /// Default: [`UnhealthyPolicy::Remove`]
    pub fn unhealthy_policy(mut self, policy: UnhealthyPolicy) -> Self {
        self.unhealthy_policy = policy;
        self
    }

    /// Set the bound on forwarded function requests.
    ///
    /// Default: 30 seconds
    pub fn proxy_timeout(mut self, timeout: Duration) -> Self {
        self.proxy_timeout = timeout;
        self
    }

    /// Set the number of concurrent background teardowns.
    ///
    /// Default: 4
    pub fn teardown_concurrency(mut self, concurrency: usize) -> Self {
        self.teardown_concurrency = concurrency;
        self
    }

    /// Set the staging sweep interval.
    ///
    /// Default: 10 minutes
    pub fn staging_sweep_interval(mut self, interval: Duration) -> Self {
        self.staging_sweep_interval = interval;
        self
    }

    /// Set the age after which staging artifacts are swept.
    ///
    /// Default: 1 hour
    pub fn staging_max_age(mut self, max_age: Duration) -> Self {
        self.staging_max_age = max_age;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<ControlPlaneRuntimeConfig> {
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("store is required"))?;
        let container_runtime = self
            .container_runtime
            .ok_or_else(|| anyhow::anyhow!("container_runtime is required"))?;

        Ok(ControlPlaneRuntimeConfig {
            store,
            container_runtime,
            bind_addr: self.bind_addr,
            uploads_dir: self.uploads_dir,
            extractions_dir: self.extractions_dir,
            container_host: self.container_host,
            readiness: self.readiness,
            unhealthy_policy: self.unhealthy_policy,
            proxy_timeout: self.proxy_timeout,
            teardown_concurrency: self.teardown_concurrency,
            staging_sweep_interval: self.staging_sweep_interval,
            staging_max_age: self.staging_max_age,
        })
    }
}

/// Configuration for a [`ControlPlaneRuntime`].
pub struct ControlPlaneRuntimeConfig {
    store: Arc<dyn Store>,
    container_runtime: Arc<dyn ContainerRuntime>,
    bind_addr: SocketAddr,
    uploads_dir: PathBuf,
    extractions_dir: PathBuf,
    container_host: String,
    readiness: ReadinessPolicy,
    unhealthy_policy: UnhealthyPolicy,
    proxy_timeout: Duration,
    teardown_concurrency: usize,
    staging_sweep_interval: Duration,
    staging_max_age: Duration,
}

impl ControlPlaneRuntimeConfig {
    /// Start the runtime, spawning the HTTP server and the staging sweeper.
    pub async fn start(self) -> Result<ControlPlaneRuntime> {
        tokio::fs::create_dir_all(&self.uploads_dir).await?;
        tokio::fs::create_dir_all(&self.extractions_dir).await?;

        let state = Arc::new(
            ControlPlaneState::new(self.store.clone(), self.container_runtime.clone())
                .with_staging_dirs(self.uploads_dir.clone(), self.extractions_dir.clone())
                .with_container_host(self.container_host.clone())
                .with_readiness(self.readiness)
                .with_unhealthy_policy(self.unhealthy_policy)
                .with_proxy_timeout(self.proxy_timeout)
                .with_teardown_concurrency(self.teardown_concurrency),
        );

        let sweeper = StagingSweeper::new(StagingSweeperConfig {
            uploads_dir: self.uploads_dir,
            extractions_dir: self.extractions_dir,
            poll_interval: self.staging_sweep_interval,
            max_age: self.staging_max_age,
        });
        let sweeper_shutdown = sweeper.shutdown_handle();
        let sweeper_handle = tokio::spawn(async move {
            sweeper.run().await;
        });

        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;
        let bind_addr = listener.local_addr()?;

        let (server_shutdown_tx, mut server_shutdown_rx) = watch::channel(false);
        let server_handle = tokio::spawn(serve_http(listener, state.clone(), async move {
            while server_shutdown_rx.changed().await.is_ok() {
                if *server_shutdown_rx.borrow() {
                    break;
                }
            }
        }));

        info!(
            bind_addr = %bind_addr,
            runtime_type = self.container_runtime.runtime_type(),
            "ControlPlaneRuntime started"
        );

        Ok(ControlPlaneRuntime {
            server_handle,
            sweeper_handle,
            server_shutdown_tx,
            sweeper_shutdown,
            state,
            bind_addr,
        })
    }
}

/// A running control plane that can be embedded in an application.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct ControlPlaneRuntime {
    server_handle: JoinHandle<Result<()>>,
    sweeper_handle: JoinHandle<()>,
    server_shutdown_tx: watch::Sender<bool>,
    sweeper_shutdown: Arc<Notify>,
    state: Arc<ControlPlaneState>,
    bind_addr: SocketAddr,
}

impl ControlPlaneRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> ControlPlaneRuntimeBuilder {
        ControlPlaneRuntimeBuilder::new()
    }

    /// Address the HTTP server is bound to.
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Shared control-plane state.
    pub fn state(&self) -> &Arc<ControlPlaneState> {
        &self.state
    }

    /// Gracefully shut down the runtime.
    ///
    /// Stops accepting requests, waits for in-flight requests, then waits for
    /// queued container teardowns to finish.
    pub async fn shutdown(self) -> Result<()> {
        info!("ControlPlaneRuntime shutting down...");

        let _ = self.server_shutdown_tx.send(true);
        self.sweeper_shutdown.notify_one();

        if let Err(e) = self.sweeper_handle.await {
            error!("Staging sweeper task panicked: {}", e);
        }

        let server_result = match self.server_handle.await {
            Ok(result) => result,
            Err(e) => Err(anyhow::anyhow!("server task panicked: {}", e)),
        };

        self.state.teardown.wait_idle().await;
        info!(
            completed = self.state.teardown.completed(),
            failed = self.state.teardown.failed(),
            "Container teardowns drained"
        );

        match server_result {
            Ok(()) => {
                info!("ControlPlaneRuntime shutdown complete");
                Ok(())
            }
            Err(e) => {
                error!("ControlPlaneRuntime server error during shutdown: {}", e);
                Err(e)
            }
        }
    }

    /// Check if the runtime is still running.
    pub fn is_running(&self) -> bool {
        !self.server_handle.is_finished() && !self.sweeper_handle.is_finished()
    }
}
