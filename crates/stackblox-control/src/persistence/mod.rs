// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends for stackblox-control.
//!
//! Rows are soft-deleted; uniqueness holds over live rows only. A unique
//! violation always surfaces as [`StoreError::Conflict`], which makes the
//! store's constraints the final word on duplicates regardless of any
//! pre-checks done by callers.

pub mod memory;
pub mod postgres;

pub use self::memory::MemoryStore;
pub use self::postgres::PostgresStore;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::model::{
    Database, Function, NewDatabase, NewFunction, NewProject, Project, ProjectSnapshot,
};

/// Errors from store operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// A unique constraint was violated.
    #[error("{0}")]
    Conflict(String),

    /// The row to update or delete does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored value could not be decoded.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// The store is temporarily unable to serve the request.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Metadata store for projects, functions, and databases.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a project. Fails with `Conflict` on a duplicate name or network.
    async fn create_project(&self, new: &NewProject) -> Result<Project>;

    /// Get a live project by ID.
    async fn find_project(&self, id: Uuid) -> Result<Option<Project>>;

    /// Get a live project by its unique name.
    async fn find_project_by_name(&self, name: &str) -> Result<Option<Project>>;

    /// List live projects, oldest first.
    async fn list_projects(&self) -> Result<Vec<Project>>;

    /// Change a project's name. The network name is left as is.
    async fn rename_project(&self, id: Uuid, name: &str) -> Result<Project>;

    /// Soft-delete a project and its function and database rows.
    async fn delete_project(&self, id: Uuid) -> Result<()>;

    /// Insert a function version, or refresh `updated_at` when
    /// `(slug, version, project_id)` already exists.
    async fn upsert_function(&self, new: &NewFunction) -> Result<Function>;

    /// Get one function version.
    async fn find_function(
        &self,
        project_id: Uuid,
        slug: &str,
        version: &str,
    ) -> Result<Option<Function>>;

    /// Get the most recently deployed version of a function.
    async fn find_latest_function(&self, project_id: Uuid, slug: &str)
    -> Result<Option<Function>>;

    /// List all live function versions of a project.
    async fn list_functions(&self, project_id: Uuid) -> Result<Vec<Function>>;

    /// Whether a live database with this name exists in the project.
    async fn database_exists(&self, project_id: Uuid, name: &str) -> Result<bool>;

    /// Insert a database. Fails with `Conflict` on a duplicate `(name, project_id)`.
    async fn create_database(&self, new: &NewDatabase) -> Result<Database>;

    /// Get a live database of a project by ID.
    async fn find_database(&self, project_id: Uuid, id: Uuid) -> Result<Option<Database>>;

    /// List all live databases of a project.
    async fn list_databases(&self, project_id: Uuid) -> Result<Vec<Database>>;

    /// Soft-delete a database.
    async fn delete_database(&self, id: Uuid) -> Result<()>;

    /// Load a project with its functions and databases.
    async fn load_snapshot(&self, project: Project) -> Result<ProjectSnapshot> {
        let functions = self.list_functions(project.id).await?;
        let databases = self.list_databases(project.id).await?;
        Ok(ProjectSnapshot {
            project,
            functions,
            databases,
        })
    }
}
