// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background teardown of function containers.
//!
//! Requests enqueue a container and return immediately. A single worker task
//! drains the queue and runs at most `concurrency` stop/remove jobs at once.
//! Outcomes are never reported back to the request; they are counted, and
//! failures are logged at `error` level with the container ID.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Notify, Semaphore, mpsc};
use tracing::{debug, error, info, warn};

use crate::container::{ContainerRuntime, RuntimeError};

/// Default number of teardowns allowed to run at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Default)]
struct Stats {
    completed: AtomicU64,
    failed: AtomicU64,
    pending: AtomicU64,
    idle: Notify,
}

impl Stats {
    fn finish(&self, ok: bool) {
        if ok {
            self.completed.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Handle to the teardown worker.
#[derive(Clone)]
pub struct TeardownQueue {
    sender: mpsc::UnboundedSender<String>,
    stats: Arc<Stats>,
}

impl TeardownQueue {
    /// Spawn the worker task.
    ///
    /// The worker exits once every handle has been dropped and the queue is drained.
    pub fn spawn(runtime: Arc<dyn ContainerRuntime>, concurrency: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let stats = Arc::new(Stats::default());
        let concurrency = concurrency.max(1);

        tokio::spawn(run_worker(
            receiver,
            runtime,
            Arc::new(Semaphore::new(concurrency)),
            stats.clone(),
        ));

        Self { sender, stats }
    }

    /// Schedule a container to be stopped and removed.
    pub fn enqueue(&self, container_id: impl Into<String>) {
        let container_id = container_id.into();
        self.stats.pending.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.sender.send(container_id) {
            error!(container_id = %e.0, "Teardown worker is gone; container left behind");
            self.stats.finish(false);
        }
    }

    /// Teardowns that finished successfully.
    pub fn completed(&self) -> u64 {
        self.stats.completed.load(Ordering::SeqCst)
    }

    /// Teardowns that failed.
    pub fn failed(&self) -> u64 {
        self.stats.failed.load(Ordering::SeqCst)
    }

    /// Teardowns queued or running.
    pub fn pending(&self) -> u64 {
        self.stats.pending.load(Ordering::SeqCst)
    }

    /// Wait until nothing is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.stats.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Hands a container to the queue when dropped.
///
/// Created as soon as a container exists, so the container is torn down even
/// when the invocation future is dropped mid-flight.
pub struct TeardownGuard {
    queue: TeardownQueue,
    container_id: Option<String>,
}

impl TeardownGuard {
    /// Guard `container_id` on `queue`.
    pub fn new(queue: &TeardownQueue, container_id: impl Into<String>) -> Self {
        Self {
            queue: queue.clone(),
            container_id: Some(container_id.into()),
        }
    }

    /// Leave the container in place.
    pub fn disarm(mut self) {
        self.container_id = None;
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        if let Some(container_id) = self.container_id.take() {
            self.queue.enqueue(container_id);
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<String>,
    runtime: Arc<dyn ContainerRuntime>,
    semaphore: Arc<Semaphore>,
    stats: Arc<Stats>,
) {
    debug!(
        concurrency = semaphore.available_permits(),
        "Teardown worker started"
    );

    while let Some(container_id) = receiver.recv().await {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let runtime = runtime.clone();
        let stats = stats.clone();

        tokio::spawn(async move {
            let _permit = permit;
            match stop_and_remove(runtime.as_ref(), &container_id).await {
                Ok(()) => {
                    info!(container_id = %container_id, "Container torn down");
                    stats.finish(true);
                }
                Err(e) => {
                    error!(container_id = %container_id, error = %e, "Container teardown failed");
                    stats.finish(false);
                }
            }
        });
    }

    debug!("Teardown worker stopped");
}

/// Stop a container, then remove it with its anonymous volumes.
///
/// A failed stop falls back to a forced removal. A container that is already
/// gone counts as torn down.
pub async fn stop_and_remove(
    runtime: &dyn ContainerRuntime,
    container_id: &str,
) -> Result<(), RuntimeError> {
    let force = match runtime.stop_container(container_id).await {
        Ok(()) => false,
        Err(e) if e.is_not_found() => return Ok(()),
        Err(e) => {
            warn!(container_id, error = %e, "Stop failed; forcing removal");
            true
        }
    };

    match runtime.remove_container(container_id, force, true).await {
        Err(e) if !e.is_not_found() => Err(e),
        _ => Ok(()),
    }
}
