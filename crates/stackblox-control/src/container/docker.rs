// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Docker CLI runtime implementation.
//!
//! Drives the `docker` binary through `tokio::process::Command`. Every call is
//! wrapped in a timeout, and the child is killed if the timeout fires.

use std::collections::HashMap;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use super::traits::*;

/// Configuration for [`DockerCli`].
#[derive(Debug, Clone)]
pub struct DockerCliConfig {
    /// Path or name of the docker binary.
    pub binary: String,
    /// Bound on ordinary calls (create, start, inspect, remove).
    pub runtime_timeout: Duration,
    /// Bound on image pulls.
    pub pull_timeout: Duration,
    /// Bound on image builds.
    pub build_timeout: Duration,
}

impl Default for DockerCliConfig {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
            runtime_timeout: Duration::from_secs(30),
            pull_timeout: Duration::from_secs(300),
            build_timeout: Duration::from_secs(600),
        }
    }
}

impl DockerCliConfig {
    /// Derive runtime settings from the control-plane configuration.
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            binary: config.docker_bin.clone(),
            runtime_timeout: config.runtime_timeout,
            pull_timeout: config.pull_timeout,
            build_timeout: config.build_timeout,
        }
    }
}

/// Container runtime backed by the docker CLI.
pub struct DockerCli {
    config: DockerCliConfig,
}

impl DockerCli {
    /// Create a new docker runtime.
    pub fn new(config: DockerCliConfig) -> Self {
        Self { config }
    }

    async fn run(
        &self,
        op: &'static str,
        args: &[String],
        timeout: Duration,
    ) -> Result<Output> {
        debug!(op, args = ?args, "docker");
        let child = Command::new(&self.config.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| RuntimeError::Timeout { op })?
            .map_err(RuntimeError::from)
    }

    /// Run a command and map a non-zero exit to a classified error.
    async fn run_checked(
        &self,
        op: &'static str,
        kind: &'static str,
        name: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<String> {
        let output = self.run(op, args, timeout).await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(classify_failure(
                op,
                kind,
                name,
                &String::from_utf8_lossy(&output.stderr),
            ))
        }
    }
}

/// Map docker stderr to a runtime error kind.
fn classify_failure(op: &'static str, kind: &'static str, name: &str, stderr: &str) -> RuntimeError {
    let lower = stderr.to_lowercase();
    if lower.contains("no such") || lower.contains("not found") {
        RuntimeError::NotFound {
            kind,
            name: name.to_string(),
        }
    } else if lower.contains("already exists") || lower.contains("is already in use") {
        RuntimeError::AlreadyExists {
            kind,
            name: name.to_string(),
        }
    } else {
        RuntimeError::CommandFailed {
            op,
            stderr: stderr.trim().to_string(),
        }
    }
}

fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// `docker create` arguments for a container spec.
fn create_args(spec: &ContainerSpec) -> Vec<String> {
    let mut out = vec!["create".to_string(), "--name".to_string(), spec.name.clone()];
    if let Some(network) = &spec.network {
        out.push("--network".to_string());
        out.push(network.clone());
    }
    out.push("--restart".to_string());
    out.push(spec.restart_policy.as_str().to_string());
    for (key, value) in &spec.env {
        out.push("--env".to_string());
        out.push(format!("{}={}", key, value));
    }
    for mount in &spec.mounts {
        out.push("--volume".to_string());
        out.push(format!("{}:{}", mount.volume, mount.target));
    }
    for binding in &spec.port_bindings {
        let host_port = binding.host_port.map(|p| p.to_string()).unwrap_or_default();
        out.push("--publish".to_string());
        out.push(format!(
            "{}:{}:{}/tcp",
            binding.host_ip, host_port, binding.container_port
        ));
    }
    out.push(spec.image.clone());
    out
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedNetwork {
    id: String,
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedContainer {
    id: String,
    name: String,
    state: InspectedState,
    network_settings: InspectedNetworkSettings,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedState {
    running: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedNetworkSettings {
    #[serde(default)]
    ports: Option<HashMap<String, Option<Vec<InspectedBinding>>>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedBinding {
    host_ip: String,
    host_port: String,
}

/// Parse `docker container inspect` output (a JSON array).
fn parse_container_inspect(stdout: &str, id: &str) -> Result<ContainerInfo> {
    let mut parsed: Vec<InspectedContainer> = serde_json::from_str(stdout)?;
    if parsed.is_empty() {
        return Err(RuntimeError::NotFound {
            kind: "container",
            name: id.to_string(),
        });
    }
    let container = parsed.swap_remove(0);

    let mut ports = HashMap::new();
    for (port, bindings) in container.network_settings.ports.unwrap_or_default() {
        let bindings: Vec<HostBinding> = bindings
            .unwrap_or_default()
            .into_iter()
            .filter_map(|b| {
                b.host_port.parse().ok().map(|host_port| HostBinding {
                    host_ip: b.host_ip,
                    host_port,
                })
            })
            .collect();
        ports.insert(port, bindings);
    }

    Ok(ContainerInfo {
        id: container.id,
        name: container.name.trim_start_matches('/').to_string(),
        running: container.state.running,
        ports,
    })
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    fn runtime_type(&self) -> &'static str {
        "docker"
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        info!(image, "Pulling image");
        self.run_checked(
            "pull",
            "image",
            image,
            &args(["pull", "--quiet", image]),
            self.config.pull_timeout,
        )
        .await?;
        Ok(())
    }

    async fn build_image(&self, context_tar: Vec<u8>, tags: &[String]) -> Result<()> {
        let mut build_args = vec!["build".to_string(), "--quiet".to_string()];
        for tag in tags {
            build_args.push("--tag".to_string());
            build_args.push(tag.clone());
        }
        build_args.push("-".to_string());

        info!(tags = ?tags, context_bytes = context_tar.len(), "Building image");
        let mut child = Command::new(&self.config.binary)
            .args(&build_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RuntimeError::Other("build stdin unavailable".to_string()))?;
        let writer = async move {
            stdin.write_all(&context_tar).await?;
            stdin.shutdown().await
        };

        let (written, output) = tokio::time::timeout(self.config.build_timeout, async {
            tokio::join!(writer, child.wait_with_output())
        })
        .await
        .map_err(|_| RuntimeError::Timeout { op: "build" })?;

        let output = output?;
        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                op: "build",
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        written?;
        Ok(())
    }

    async fn remove_image(&self, image: &str, force: bool, prune_children: bool) -> Result<()> {
        let mut rm_args = args(["image", "rm"]);
        if force {
            rm_args.push("--force".to_string());
        }
        if !prune_children {
            rm_args.push("--no-prune".to_string());
        }
        rm_args.push(image.to_string());
        self.run_checked(
            "remove image",
            "image",
            image,
            &rm_args,
            self.config.runtime_timeout,
        )
        .await?;
        Ok(())
    }

    async fn create_network(&self, name: &str) -> Result<NetworkInfo> {
        let id = self
            .run_checked(
                "create network",
                "network",
                name,
                &args(["network", "create", "--driver", "bridge", name]),
                self.config.runtime_timeout,
            )
            .await?;
        Ok(NetworkInfo {
            id,
            name: name.to_string(),
        })
    }

    async fn inspect_network(&self, name: &str) -> Result<NetworkInfo> {
        let stdout = self
            .run_checked(
                "inspect network",
                "network",
                name,
                &args(["network", "inspect", name]),
                self.config.runtime_timeout,
            )
            .await?;
        let mut parsed: Vec<InspectedNetwork> = serde_json::from_str(&stdout)?;
        if parsed.is_empty() {
            return Err(RuntimeError::NotFound {
                kind: "network",
                name: name.to_string(),
            });
        }
        let network = parsed.swap_remove(0);
        Ok(NetworkInfo {
            id: network.id,
            name: network.name,
        })
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        self.run_checked(
            "remove network",
            "network",
            name,
            &args(["network", "rm", name]),
            self.config.runtime_timeout,
        )
        .await?;
        Ok(())
    }

    async fn create_volume(&self, name: &str) -> Result<()> {
        self.run_checked(
            "create volume",
            "volume",
            name,
            &args(["volume", "create", name]),
            self.config.runtime_timeout,
        )
        .await?;
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        self.run_checked(
            "remove volume",
            "volume",
            name,
            &args(["volume", "rm", name]),
            self.config.runtime_timeout,
        )
        .await?;
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        self.run_checked(
            "create container",
            "container",
            &spec.name,
            &create_args(spec),
            self.config.runtime_timeout,
        )
        .await
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.run_checked(
            "start container",
            "container",
            id,
            &args(["start", id]),
            self.config.runtime_timeout,
        )
        .await?;
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        self.run_checked(
            "stop container",
            "container",
            id,
            &args(["stop", id]),
            self.config.runtime_timeout,
        )
        .await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool, volumes: bool) -> Result<()> {
        let mut rm_args = args(["rm"]);
        if force {
            rm_args.push("--force".to_string());
        }
        if volumes {
            rm_args.push("--volumes".to_string());
        }
        rm_args.push(id.to_string());
        self.run_checked(
            "remove container",
            "container",
            id,
            &rm_args,
            self.config.runtime_timeout,
        )
        .await?;
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo> {
        let stdout = self
            .run_checked(
                "inspect container",
                "container",
                id,
                &args(["container", "inspect", id]),
                self.config.runtime_timeout,
            )
            .await?;
        parse_container_inspect(&stdout, id)
    }
}
