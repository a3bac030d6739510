// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock container runtime for testing.
//!
//! Keeps images, networks, volumes, and containers in memory and records every
//! call in order, so tests can assert both end state and call sequence.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::traits::*;

/// One recorded runtime call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    /// `pull_image(image)`
    PullImage(String),
    /// `build_image(_, tags)`
    BuildImage(Vec<String>),
    /// `remove_image(image, ..)`
    RemoveImage(String),
    /// `create_network(name)`
    CreateNetwork(String),
    /// `inspect_network(name)`
    InspectNetwork(String),
    /// `remove_network(name)`
    RemoveNetwork(String),
    /// `create_volume(name)`
    CreateVolume(String),
    /// `remove_volume(name)`
    RemoveVolume(String),
    /// `create_container(spec)` by container name
    CreateContainer(String),
    /// `start_container(id)`
    StartContainer(String),
    /// `stop_container(id)`
    StopContainer(String),
    /// `remove_container(id, _, volumes)`
    RemoveContainer(String),
    /// `inspect_container(id)`
    InspectContainer(String),
}

/// Operation names accepted by [`MockRuntime::fail_on`].
pub mod ops {
    /// `pull_image`
    pub const PULL_IMAGE: &str = "pull_image";
    /// `build_image`
    pub const BUILD_IMAGE: &str = "build_image";
    /// `remove_image`
    pub const REMOVE_IMAGE: &str = "remove_image";
    /// `create_network`
    pub const CREATE_NETWORK: &str = "create_network";
    /// `inspect_network`
    pub const INSPECT_NETWORK: &str = "inspect_network";
    /// `remove_network`
    pub const REMOVE_NETWORK: &str = "remove_network";
    /// `create_volume`
    pub const CREATE_VOLUME: &str = "create_volume";
    /// `remove_volume`
    pub const REMOVE_VOLUME: &str = "remove_volume";
    /// `create_container`
    pub const CREATE_CONTAINER: &str = "create_container";
    /// `start_container`
    pub const START_CONTAINER: &str = "start_container";
    /// `stop_container`
    pub const STOP_CONTAINER: &str = "stop_container";
    /// `remove_container`
    pub const REMOVE_CONTAINER: &str = "remove_container";
    /// `inspect_container`
    pub const INSPECT_CONTAINER: &str = "inspect_container";
}

/// A container known to the mock.
#[derive(Debug, Clone)]
pub struct MockContainer {
    /// Spec the container was created with.
    pub spec: ContainerSpec,
    /// Whether the container is running.
    pub running: bool,
}

#[derive(Default)]
struct MockState {
    images: HashSet<String>,
    networks: HashSet<String>,
    volumes: HashSet<String>,
    containers: HashMap<String, MockContainer>,
    calls: Vec<RuntimeCall>,
    failures: HashMap<&'static str, String>,
    build_contexts: Vec<Vec<u8>>,
    host_port: u16,
}

/// Mock container runtime for testing.
#[derive(Clone)]
pub struct MockRuntime {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRuntime {
    /// Create an empty mock runtime. Published ports are assigned host port 49153.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                host_port: 49153,
                ..Default::default()
            })),
        }
    }

    /// Host port reported for every OS-assigned port binding.
    pub async fn set_host_port(&self, port: u16) {
        self.state.lock().await.host_port = port;
    }

    /// Make every subsequent call of `op` fail with `CommandFailed`.
    pub async fn fail_on(&self, op: &'static str, message: &str) {
        self.state
            .lock()
            .await
            .failures
            .insert(op, message.to_string());
    }

    /// Stop injecting failures for `op`.
    pub async fn clear_failure(&self, op: &'static str) {
        self.state.lock().await.failures.remove(op);
    }

    /// Register an image as present.
    pub async fn add_image(&self, image: &str) {
        self.state.lock().await.images.insert(image.to_string());
    }

    /// Register a network as present.
    pub async fn add_network(&self, name: &str) {
        self.state.lock().await.networks.insert(name.to_string());
    }

    /// All recorded calls, in order.
    pub async fn calls(&self) -> Vec<RuntimeCall> {
        self.state.lock().await.calls.clone()
    }

    /// Forget recorded calls.
    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Whether an image is present.
    pub async fn has_image(&self, image: &str) -> bool {
        self.state.lock().await.images.contains(image)
    }

    /// Whether a network is present.
    pub async fn has_network(&self, name: &str) -> bool {
        self.state.lock().await.networks.contains(name)
    }

    /// Whether a volume is present.
    pub async fn has_volume(&self, name: &str) -> bool {
        self.state.lock().await.volumes.contains(name)
    }

    /// Number of networks present.
    pub async fn network_count(&self) -> usize {
        self.state.lock().await.networks.len()
    }

    /// Number of volumes present.
    pub async fn volume_count(&self) -> usize {
        self.state.lock().await.volumes.len()
    }

    /// A container by name.
    pub async fn container(&self, name: &str) -> Option<MockContainer> {
        self.state.lock().await.containers.get(name).cloned()
    }

    /// All containers currently present.
    pub async fn containers(&self) -> Vec<MockContainer> {
        self.state.lock().await.containers.values().cloned().collect()
    }

    /// Build contexts received, in order.
    pub async fn build_contexts(&self) -> Vec<Vec<u8>> {
        self.state.lock().await.build_contexts.clone()
    }
}

impl MockState {
    /// Record a call and return the injected failure for `op`, if any.
    fn enter(&mut self, op: &'static str, call: RuntimeCall) -> Result<()> {
        self.calls.push(call);
        match self.failures.get(op) {
            Some(message) => Err(RuntimeError::CommandFailed {
                op,
                stderr: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

fn not_found(kind: &'static str, name: &str) -> RuntimeError {
    RuntimeError::NotFound {
        kind,
        name: name.to_string(),
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    fn runtime_type(&self) -> &'static str {
        "mock"
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter(ops::PULL_IMAGE, RuntimeCall::PullImage(image.to_string()))?;
        state.images.insert(image.to_string());
        Ok(())
    }

    async fn build_image(&self, context_tar: Vec<u8>, tags: &[String]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter(ops::BUILD_IMAGE, RuntimeCall::BuildImage(tags.to_vec()))?;
        state.build_contexts.push(context_tar);
        state.images.extend(tags.iter().cloned());
        Ok(())
    }

    async fn remove_image(&self, image: &str, _force: bool, _prune_children: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter(ops::REMOVE_IMAGE, RuntimeCall::RemoveImage(image.to_string()))?;
        if !state.images.remove(image) {
            return Err(not_found("image", image));
        }
        Ok(())
    }

    async fn create_network(&self, name: &str) -> Result<NetworkInfo> {
        let mut state = self.state.lock().await;
        state.enter(
            ops::CREATE_NETWORK,
            RuntimeCall::CreateNetwork(name.to_string()),
        )?;
        if !state.networks.insert(name.to_string()) {
            return Err(RuntimeError::AlreadyExists {
                kind: "network",
                name: name.to_string(),
            });
        }
        Ok(NetworkInfo {
            id: format!("mock-{}", name),
            name: name.to_string(),
        })
    }

    async fn inspect_network(&self, name: &str) -> Result<NetworkInfo> {
        let mut state = self.state.lock().await;
        state.enter(
            ops::INSPECT_NETWORK,
            RuntimeCall::InspectNetwork(name.to_string()),
        )?;
        if !state.networks.contains(name) {
            return Err(not_found("network", name));
        }
        Ok(NetworkInfo {
            id: format!("mock-{}", name),
            name: name.to_string(),
        })
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter(
            ops::REMOVE_NETWORK,
            RuntimeCall::RemoveNetwork(name.to_string()),
        )?;
        if !state.networks.remove(name) {
            return Err(not_found("network", name));
        }
        Ok(())
    }

    async fn create_volume(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter(ops::CREATE_VOLUME, RuntimeCall::CreateVolume(name.to_string()))?;
        state.volumes.insert(name.to_string());
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter(ops::REMOVE_VOLUME, RuntimeCall::RemoveVolume(name.to_string()))?;
        if !state.volumes.remove(name) {
            return Err(not_found("volume", name));
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let mut state = self.state.lock().await;
        state.enter(
            ops::CREATE_CONTAINER,
            RuntimeCall::CreateContainer(spec.name.clone()),
        )?;
        if !state.images.contains(&spec.image) {
            return Err(not_found("image", &spec.image));
        }
        if let Some(network) = &spec.network
            && !state.networks.contains(network)
        {
            return Err(not_found("network", network));
        }
        if state.containers.contains_key(&spec.name) {
            return Err(RuntimeError::AlreadyExists {
                kind: "container",
                name: spec.name.clone(),
            });
        }
        state.containers.insert(
            spec.name.clone(),
            MockContainer {
                spec: spec.clone(),
                running: false,
            },
        );
        Ok(spec.name.clone())
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter(
            ops::START_CONTAINER,
            RuntimeCall::StartContainer(id.to_string()),
        )?;
        match state.containers.get_mut(id) {
            Some(container) => {
                container.running = true;
                Ok(())
            }
            None => Err(not_found("container", id)),
        }
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter(ops::STOP_CONTAINER, RuntimeCall::StopContainer(id.to_string()))?;
        match state.containers.get_mut(id) {
            Some(container) => {
                container.running = false;
                Ok(())
            }
            None => Err(not_found("container", id)),
        }
    }

    async fn remove_container(&self, id: &str, force: bool, _volumes: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter(
            ops::REMOVE_CONTAINER,
            RuntimeCall::RemoveContainer(id.to_string()),
        )?;
        let running = match state.containers.get(id) {
            Some(container) => container.running,
            None => return Err(not_found("container", id)),
        };
        if running && !force {
            return Err(RuntimeError::CommandFailed {
                op: "remove container",
                stderr: format!("container {} is running", id),
            });
        }
        // Named volumes survive, as with the real runtime.
        state.containers.remove(id);
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo> {
        let mut state = self.state.lock().await;
        state.enter(
            ops::INSPECT_CONTAINER,
            RuntimeCall::InspectContainer(id.to_string()),
        )?;
        let host_port = state.host_port;
        let container = state
            .containers
            .get(id)
            .ok_or_else(|| not_found("container", id))?;

        let mut ports = HashMap::new();
        if container.running {
            for binding in &container.spec.port_bindings {
                ports.insert(
                    format!("{}/tcp", binding.container_port),
                    vec![HostBinding {
                        host_ip: binding.host_ip.clone(),
                        host_port: binding.host_port.unwrap_or(host_port),
                    }],
                );
            }
        }

        Ok(ContainerInfo {
            id: id.to_string(),
            name: container.spec.name.clone(),
            running: container.running,
            ports,
        })
    }
}
