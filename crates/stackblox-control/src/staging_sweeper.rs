// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker for removing stale deploy staging artifacts.
//!
//! Every deploy removes its own staged upload and extraction directory when it
//! finishes. Artifacts survive only if the process dies mid-deploy; this worker
//! periodically removes anything older than `max_age` from both directories.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Configuration for the staging sweeper.
#[derive(Debug, Clone)]
pub struct StagingSweeperConfig {
    /// Staged archive uploads.
    pub uploads_dir: PathBuf,
    /// Archive extraction directories.
    pub extractions_dir: PathBuf,
    /// How often to sweep.
    pub poll_interval: Duration,
    /// Minimum age of an artifact before it is removed.
    pub max_age: Duration,
}

impl Default for StagingSweeperConfig {
    fn default() -> Self {
        Self {
            uploads_dir: PathBuf::from(".data/uploads"),
            extractions_dir: PathBuf::from(".data/extractions"),
            poll_interval: Duration::from_secs(600),
            max_age: Duration::from_secs(3600),
        }
    }
}

/// Background worker that removes stale staging artifacts.
pub struct StagingSweeper {
    config: StagingSweeperConfig,
    shutdown: Arc<Notify>,
}

impl StagingSweeper {
    /// Create a new sweeper.
    pub fn new(config: StagingSweeperConfig) -> Self {
        Self {
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the sweep loop until the shutdown signal is received.
    pub async fn run(&self) {
        info!(
            uploads_dir = %self.config.uploads_dir.display(),
            extractions_dir = %self.config.extractions_dir.display(),
            poll_interval_secs = self.config.poll_interval.as_secs(),
            max_age_secs = self.config.max_age.as_secs(),
            "Staging sweeper started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Staging sweeper received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {
                    self.sweep().await;
                }
            }
        }

        info!("Staging sweeper stopped");
    }

    /// Remove stale artifacts from both staging directories.
    ///
    /// Returns the number of removed entries and the number of failures.
    pub async fn sweep(&self) -> (u64, u64) {
        let (uploads_cleaned, uploads_errors) =
            sweep_dir(&self.config.uploads_dir, self.config.max_age).await;
        let (extractions_cleaned, extractions_errors) =
            sweep_dir(&self.config.extractions_dir, self.config.max_age).await;

        let cleaned = uploads_cleaned + extractions_cleaned;
        let errors = uploads_errors + extractions_errors;
        if cleaned > 0 || errors > 0 {
            info!(cleaned, errors, "Staging sweep completed");
        } else {
            debug!("Staging sweep completed, nothing stale");
        }
        (cleaned, errors)
    }
}

async fn sweep_dir(dir: &Path, max_age: Duration) -> (u64, u64) {
    let mut cleaned = 0u64;
    let mut errors = 0u64;

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return (0, 0),
        Err(e) => {
            error!(path = %dir.display(), error = %e, "Failed to read staging directory");
            return (0, 1);
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();

        let metadata = match entry.metadata().await {
            Ok(m) => m,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Failed to read metadata");
                errors += 1;
                continue;
            }
        };

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .unwrap_or_default();
        if age < max_age {
            continue;
        }

        let removed = if metadata.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        match removed {
            Ok(()) => {
                debug!(path = %path.display(), age_secs = age.as_secs(), "Removed stale staging artifact");
                cleaned += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove stale staging artifact");
                errors += 1;
            }
        }
    }

    (cleaned, errors)
}
