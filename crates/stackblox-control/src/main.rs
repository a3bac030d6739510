// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stackblox Control - HTTP control plane server
//!
//! Serves the project, function and database API on top of the Docker CLI.

use std::sync::Arc;
use tracing::{info, warn};

use stackblox_control::config::{Config, StoreKind};
use stackblox_control::container::{ContainerRuntime, DockerCli, DockerCliConfig};
use stackblox_control::executor::UnhealthyPolicy;
use stackblox_control::migrations;
use stackblox_control::persistence::{MemoryStore, PostgresStore, Store};
use stackblox_control::runtime::ControlPlaneRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present; RUST_LOG may come from it
    let dotenv = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stackblox_control=info,tower_http=info".into()),
        )
        .init();

    if let Err(e) = dotenv {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;

    info!(
        http_addr = %config.http_addr,
        data_dir = %config.data_dir.display(),
        store = ?config.store,
        "Starting Stackblox Control"
    );

    let store: Arc<dyn Store> = match config.store {
        StoreKind::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("database URL is required for the postgres store"))?;
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await?;
            info!("Connected to database");

            migrations::run_postgres(&pool).await?;
            info!("Database migrations applied");

            Arc::new(PostgresStore::new(pool))
        }
        StoreKind::Memory => {
            warn!("Using in-memory store; metadata is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let docker = Arc::new(DockerCli::new(DockerCliConfig::from_config(&config)));
    info!(runtime_type = docker.runtime_type(), "Container runtime initialized");

    let unhealthy_policy = if config.keep_unhealthy_containers {
        UnhealthyPolicy::Retain
    } else {
        UnhealthyPolicy::Remove
    };

    let runtime = ControlPlaneRuntime::builder()
        .store(store)
        .container_runtime(docker)
        .bind_addr(config.http_addr)
        .staging_dirs(&config.uploads_dir, &config.extractions_dir)
        .container_host(&config.container_host)
        .unhealthy_policy(unhealthy_policy)
        .proxy_timeout(config.proxy_timeout)
        .teardown_concurrency(config.teardown_concurrency)
        .staging_sweep_interval(config.staging_sweep_interval)
        .staging_max_age(config.staging_max_age)
        .build()?
        .start()
        .await?;

    info!(addr = %runtime.bind_addr(), "Control plane ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    runtime.shutdown().await?;

    info!("Stackblox Control shut down");

    Ok(())
}
