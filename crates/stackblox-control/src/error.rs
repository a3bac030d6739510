// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for stackblox-control.

use axum::http::StatusCode;
use thiserror::Error;

use crate::container::RuntimeError;
use crate::persistence::StoreError;

/// Control-plane errors.
///
/// Every variant maps to exactly one HTTP status via [`Error::status_code`]
/// and carries a human-readable hint via [`Error::hint`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed or missing request fields.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Project, function, or database absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate name within scope.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Unrecognized declared language/runtime.
    #[error("Unsupported runtime: {0}")]
    UnsupportedRuntime(String),

    /// Unrecognized database engine.
    #[error("Unsupported database type: {0}")]
    UnsupportedType(String),

    /// Container runtime call failed.
    #[error("Container runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Readiness polling was exhausted.
    #[error("Container {container} did not become healthy after {attempts} attempts")]
    Unhealthy {
        /// Container that failed its readiness checks.
        container: String,
        /// Number of probes made.
        attempts: usize,
    },

    /// Removing a resource during teardown failed.
    #[error("Failed to remove {resource}: {source}")]
    Cleanup {
        /// The resource that could not be removed.
        resource: String,
        /// Runtime failure.
        #[source]
        source: RuntimeError,
    },

    /// Persistence failure.
    #[error("Storage error: {0}")]
    Storage(StoreError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Uploaded archive could not be read or unpacked.
    #[error("Archive error: {0}")]
    Archive(String),

    /// Forwarding the request to a function container failed.
    #[error("Proxy error: {0}")]
    Proxy(String),

    /// A detached provisioning task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A compensating action failed after the original error.
    #[error("{original} (compensation failed: {compensation})")]
    Compensation {
        /// The error that triggered compensation.
        original: Box<Error>,
        /// Why the compensating action failed.
        compensation: String,
    },
}

/// Result type using the control-plane [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => Error::Conflict(msg),
            StoreError::NotFound(msg) => Error::NotFound(msg),
            other => Error::Storage(other),
        }
    }
}

impl Error {
    /// Attach a failed compensating action to this error without masking it.
    pub fn with_compensation_failure(self, compensation: impl std::fmt::Display) -> Self {
        Error::Compensation {
            original: Box::new(self),
            compensation: compensation.to_string(),
        }
    }

    /// The error that ultimately caused this one, skipping compensation wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Compensation { original, .. } => original.root(),
            other => other,
        }
    }

    /// HTTP status this error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self.root() {
            Error::Validation(_)
            | Error::Conflict(_)
            | Error::UnsupportedRuntime(_)
            | Error::UnsupportedType(_)
            | Error::Archive(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short human-readable hint for API clients.
    pub fn hint(&self) -> &'static str {
        match self.root() {
            Error::Validation(_) => "Check the request body and required fields",
            Error::NotFound(_) => "Check the identifier; the resource may have been deleted",
            Error::Conflict(_) => "Choose a different name within this project",
            Error::UnsupportedRuntime(_) => "Supported runtimes: node-js (package.json)",
            Error::UnsupportedType(_) => "Supported database types: postgres",
            Error::Archive(_) => "Upload a gzip-compressed tar archive with a manifest at its root",
            Error::Unhealthy { .. } => {
                "The function did not answer its health check; inspect the function logs"
            }
            Error::Runtime(_) => "The container runtime rejected the operation; try again later",
            Error::Cleanup { .. } => {
                "Teardown stopped at the named resource; retry once it can be removed"
            }
            Error::Proxy(_) => "The function container did not answer the forwarded request",
            _ => "An internal error occurred; try again later",
        }
    }
}
