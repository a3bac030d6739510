// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Container runtime trait definitions.
//!
//! Defines the abstract interface the control plane consumes from a container
//! runtime: images, networks, volumes, and containers.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from container runtime operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RuntimeError {
    /// The referenced object (image, network, volume, container) does not exist.
    #[error("No such {kind}: {name}")]
    NotFound {
        /// Object kind.
        kind: &'static str,
        /// Object name or ID.
        name: String,
    },

    /// An object with this name already exists.
    #[error("{kind} already exists: {name}")]
    AlreadyExists {
        /// Object kind.
        kind: &'static str,
        /// Object name.
        name: String,
    },

    /// The runtime rejected the command.
    #[error("{op} failed: {stderr}")]
    CommandFailed {
        /// Operation that failed.
        op: &'static str,
        /// Standard error output of the runtime.
        stderr: String,
    },

    /// The operation exceeded its time bound.
    #[error("{op} timed out")]
    Timeout {
        /// Operation that timed out.
        op: &'static str,
    },

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Runtime output could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error.
    #[error("Other: {0}")]
    Other(String),
}

impl RuntimeError {
    /// Whether the target object was already absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound { .. })
    }
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Container restart policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartPolicy {
    /// Never restart.
    #[default]
    No,
    /// Always restart, including after daemon restarts.
    Always,
}

impl RestartPolicy {
    /// Runtime flag value.
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::No => "no",
            RestartPolicy::Always => "always",
        }
    }
}

/// A named volume mounted into a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    /// Volume name.
    pub volume: String,
    /// Absolute path inside the container.
    pub target: String,
}

/// Publication of a container port on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    /// Port inside the container.
    pub container_port: u16,
    /// Host interface to bind on.
    pub host_ip: String,
    /// Host port; `None` lets the OS assign one.
    pub host_port: Option<u16>,
}

/// Everything needed to create a container.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    /// Container name (also its DNS name on the attached network).
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Environment variables, in order.
    pub env: Vec<(String, String)>,
    /// Named volume mounts.
    pub mounts: Vec<VolumeMount>,
    /// Network to attach to.
    pub network: Option<String>,
    /// Published ports.
    pub port_bindings: Vec<PortBinding>,
    /// Restart policy.
    pub restart_policy: RestartPolicy,
}

/// Host side of a published port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostBinding {
    /// Host interface.
    pub host_ip: String,
    /// Host port.
    pub host_port: u16,
}

/// Subset of container state the control plane reads back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Runtime container ID.
    pub id: String,
    /// Container name.
    pub name: String,
    /// Whether the container is running.
    pub running: bool,
    /// Published ports keyed by `"{port}/tcp"`.
    pub ports: HashMap<String, Vec<HostBinding>>,
}

impl ContainerInfo {
    /// Host port assigned to a container TCP port, if published.
    pub fn host_port(&self, container_port: u16) -> Option<u16> {
        self.ports
            .get(&format!("{}/tcp", container_port))
            .and_then(|bindings| bindings.first())
            .map(|b| b.host_port)
    }
}

/// Subset of network state the control plane reads back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    /// Runtime network ID.
    pub id: String,
    /// Network name.
    pub name: String,
}

/// Trait for container runtimes.
///
/// Runtimes are pure infrastructure adapters: they never touch the metadata
/// store. Every call is expected to be bounded in time by the implementation.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Runtime type identifier (e.g., "docker", "mock").
    fn runtime_type(&self) -> &'static str;

    /// Pull an image reference.
    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Build an image from a tar build context, applying every tag.
    async fn build_image(&self, context_tar: Vec<u8>, tags: &[String]) -> Result<()>;

    /// Remove an image.
    async fn remove_image(&self, image: &str, force: bool, prune_children: bool) -> Result<()>;

    /// Create an isolated bridge network.
    async fn create_network(&self, name: &str) -> Result<NetworkInfo>;

    /// Inspect a network.
    async fn inspect_network(&self, name: &str) -> Result<NetworkInfo>;

    /// Remove a network.
    async fn remove_network(&self, name: &str) -> Result<()>;

    /// Create a named volume.
    async fn create_volume(&self, name: &str) -> Result<()>;

    /// Remove a named volume.
    async fn remove_volume(&self, name: &str) -> Result<()>;

    /// Create a container; returns its ID.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    /// Start a created container.
    async fn start_container(&self, id: &str) -> Result<()>;

    /// Stop a running container.
    async fn stop_container(&self, id: &str) -> Result<()>;

    /// Remove a container, optionally with its anonymous volumes.
    async fn remove_container(&self, id: &str, force: bool, volumes: bool) -> Result<()>;

    /// Inspect a container.
    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_port_lookup() {
        let mut ports = HashMap::new();
        ports.insert(
            "8080/tcp".to_string(),
            vec![HostBinding {
                host_ip: "127.0.0.1".to_string(),
                host_port: 49153,
            }],
        );
        let info = ContainerInfo {
            id: "abc".to_string(),
            name: "func_x".to_string(),
            running: true,
            ports,
        };
        assert_eq!(info.host_port(8080), Some(49153));
        assert_eq!(info.host_port(5432), None);
    }
}
