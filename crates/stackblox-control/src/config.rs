// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for stackblox-control.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Which metadata store backs the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// PostgreSQL via sqlx.
    Postgres,
    /// Process-local store for development.
    Memory,
}

/// Control-plane configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL URL; required for [`StoreKind::Postgres`].
    pub database_url: Option<String>,
    /// Metadata store backend.
    pub store: StoreKind,
    /// HTTP listen address.
    pub http_addr: SocketAddr,
    /// Root data directory.
    pub data_dir: PathBuf,
    /// Staged archive uploads.
    pub uploads_dir: PathBuf,
    /// Archive extraction directories.
    pub extractions_dir: PathBuf,
    /// Container runtime CLI binary.
    pub docker_bin: String,
    /// Host on which function containers publish their ports.
    pub container_host: String,
    /// Bound on ordinary runtime calls.
    pub runtime_timeout: Duration,
    /// Bound on image pulls.
    pub pull_timeout: Duration,
    /// Bound on image builds.
    pub build_timeout: Duration,
    /// Bound on the forwarded function request.
    pub proxy_timeout: Duration,
    /// Max concurrent background teardowns.
    pub teardown_concurrency: usize,
    /// Leave containers that failed readiness in place.
    pub keep_unhealthy_containers: bool,
    /// How often stale staging artifacts are swept.
    pub staging_sweep_interval: Duration,
    /// Age after which a staging artifact counts as stale.
    pub staging_max_age: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let store = match std::env::var("STACKBLOX_STORE")
            .unwrap_or_else(|_| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "postgres" => StoreKind::Postgres,
            "memory" => StoreKind::Memory,
            other => return Err(ConfigError::InvalidStore(other.to_string())),
        };

        let database_url = std::env::var("STACKBLOX_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .ok();
        if store == StoreKind::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingEnvVar(
                "STACKBLOX_DATABASE_URL or DATABASE_URL",
            ));
        }

        let port: u16 = std::env::var("STACKBLOX_HTTP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;
        let http_addr = SocketAddr::from(([0, 0, 0, 0], port));

        let data_dir =
            PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| ".data".to_string()));
        let uploads_dir = std::env::var("UPLOADS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("uploads"));
        let extractions_dir = std::env::var("EXTRACTIONS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("extractions"));

        let docker_bin = std::env::var("DOCKER_BIN").unwrap_or_else(|_| "docker".to_string());
        let container_host = std::env::var("STACKBLOX_CONTAINER_HOST")
            .unwrap_or_else(|_| "127.0.0.1".to_string());

        let keep_unhealthy_containers = std::env::var("STACKBLOX_KEEP_UNHEALTHY_CONTAINERS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let teardown_concurrency = env_number("STACKBLOX_TEARDOWN_CONCURRENCY", 4)?.max(1) as usize;

        Ok(Self {
            database_url,
            store,
            http_addr,
            data_dir,
            uploads_dir,
            extractions_dir,
            docker_bin,
            container_host,
            runtime_timeout: Duration::from_secs(env_number("STACKBLOX_RUNTIME_TIMEOUT_SECS", 30)?),
            pull_timeout: Duration::from_secs(env_number("STACKBLOX_PULL_TIMEOUT_SECS", 300)?),
            build_timeout: Duration::from_secs(env_number("STACKBLOX_BUILD_TIMEOUT_SECS", 600)?),
            proxy_timeout: Duration::from_secs(env_number("STACKBLOX_PROXY_TIMEOUT_SECS", 30)?),
            teardown_concurrency,
            keep_unhealthy_containers,
            staging_sweep_interval: Duration::from_secs(env_number(
                "STACKBLOX_STAGING_SWEEP_INTERVAL_SECS",
                600,
            )?),
            staging_max_age: Duration::from_secs(env_number("STACKBLOX_STAGING_MAX_AGE_SECS", 3600)?),
        })
    }
}

fn env_number(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    /// The port number is invalid.
    #[error("Invalid port number")]
    InvalidPort,
    /// A numeric variable could not be parsed.
    #[error("Invalid numeric value for {0}")]
    InvalidNumber(&'static str),
    /// Unknown store backend.
    #[error("Invalid store backend: {0} (expected postgres or memory)")]
    InvalidStore(String),
}
