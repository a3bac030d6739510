// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory store.
//!
//! Enforces the same live-row unique constraints as the PostgreSQL schema.
//! Used for tests and for local development without a database.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Result, Store, StoreError};
use crate::model::{Database, Function, NewDatabase, NewFunction, NewProject, Project};

/// Operation names accepted by [`MemoryStore::fail_on`] and [`MemoryStore::delay_on`].
pub mod ops {
    /// `create_project`
    pub const CREATE_PROJECT: &str = "create_project";
    /// `delete_project`
    pub const DELETE_PROJECT: &str = "delete_project";
    /// `upsert_function`
    pub const UPSERT_FUNCTION: &str = "upsert_function";
    /// `create_database`
    pub const CREATE_DATABASE: &str = "create_database";
    /// `delete_database`
    pub const DELETE_DATABASE: &str = "delete_database";
}

struct Row<T> {
    value: T,
    deleted_at: Option<DateTime<Utc>>,
}

impl<T> Row<T> {
    fn live(value: T) -> Self {
        Self {
            value,
            deleted_at: None,
        }
    }

    fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

#[derive(Default)]
struct Tables {
    projects: Vec<Row<Project>>,
    functions: Vec<Row<Function>>,
    databases: Vec<Row<Database>>,
    failures: HashSet<&'static str>,
    delays: HashMap<&'static str, Duration>,
}

impl Tables {
    fn check(&self, op: &'static str) -> Result<()> {
        if self.failures.contains(op) {
            return Err(StoreError::Unavailable(format!("injected failure in {}", op)));
        }
        Ok(())
    }

    fn live_projects(&self) -> impl Iterator<Item = &Project> {
        self.projects
            .iter()
            .filter(|r| r.is_live())
            .map(|r| &r.value)
    }

    fn live_functions(&self, project_id: Uuid) -> impl Iterator<Item = &Function> {
        self.functions
            .iter()
            .filter(move |r| r.is_live() && r.value.project_id == project_id)
            .map(|r| &r.value)
    }

    fn live_databases(&self, project_id: Uuid) -> impl Iterator<Item = &Database> {
        self.databases
            .iter()
            .filter(move |r| r.is_live() && r.value.project_id == project_id)
            .map(|r| &r.value)
    }
}

/// Process-local [`Store`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call of `op` fail with `Unavailable`.
    pub async fn fail_on(&self, op: &'static str) {
        self.tables.lock().await.failures.insert(op);
    }

    /// Stop injecting failures for `op`.
    pub async fn clear_failure(&self, op: &'static str) {
        self.tables.lock().await.failures.remove(op);
    }

    /// Make every subsequent call of `op` sleep for `delay` before touching the tables.
    pub async fn delay_on(&self, op: &'static str, delay: Duration) {
        self.tables.lock().await.delays.insert(op, delay);
    }

    async fn pause(&self, op: &'static str) {
        let delay = self.tables.lock().await.delays.get(op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Number of live function rows for `(slug, version, project_id)`.
    pub async fn function_row_count(&self, project_id: Uuid, slug: &str, version: &str) -> usize {
        self.tables
            .lock()
            .await
            .live_functions(project_id)
            .filter(|f| f.slug == slug && f.version == version)
            .count()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_project(&self, new: &NewProject) -> Result<Project> {
        self.pause(ops::CREATE_PROJECT).await;
        let mut tables = self.tables.lock().await;
        tables.check(ops::CREATE_PROJECT)?;
        if tables
            .live_projects()
            .any(|p| p.name == new.name || p.network_name == new.network_name)
        {
            return Err(StoreError::Conflict(format!(
                "project '{}' already exists",
                new.name
            )));
        }

        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            name: new.name.clone(),
            network_name: new.network_name.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.projects.push(Row::live(project.clone()));
        Ok(project)
    }

    async fn find_project(&self, id: Uuid) -> Result<Option<Project>> {
        let tables = self.tables.lock().await;
        Ok(tables.live_projects().find(|p| p.id == id).cloned())
    }

    async fn find_project_by_name(&self, name: &str) -> Result<Option<Project>> {
        let tables = self.tables.lock().await;
        Ok(tables.live_projects().find(|p| p.name == name).cloned())
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let tables = self.tables.lock().await;
        Ok(tables.live_projects().cloned().collect())
    }

    async fn rename_project(&self, id: Uuid, name: &str) -> Result<Project> {
        let mut tables = self.tables.lock().await;
        if tables.live_projects().any(|p| p.name == name && p.id != id) {
            return Err(StoreError::Conflict(format!(
                "project '{}' already exists",
                name
            )));
        }
        let row = tables
            .projects
            .iter_mut()
            .find(|r| r.is_live() && r.value.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("project {}", id)))?;
        row.value.name = name.to_string();
        row.value.updated_at = Utc::now();
        Ok(row.value.clone())
    }

    async fn delete_project(&self, id: Uuid) -> Result<()> {
        self.pause(ops::DELETE_PROJECT).await;
        let mut tables = self.tables.lock().await;
        tables.check(ops::DELETE_PROJECT)?;
        let now = Utc::now();

        let row = tables
            .projects
            .iter_mut()
            .find(|r| r.is_live() && r.value.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("project {}", id)))?;
        row.deleted_at = Some(now);

        for row in tables
            .functions
            .iter_mut()
            .filter(|r| r.is_live() && r.value.project_id == id)
        {
            row.deleted_at = Some(now);
        }
        for row in tables
            .databases
            .iter_mut()
            .filter(|r| r.is_live() && r.value.project_id == id)
        {
            row.deleted_at = Some(now);
        }
        Ok(())
    }

    async fn upsert_function(&self, new: &NewFunction) -> Result<Function> {
        self.pause(ops::UPSERT_FUNCTION).await;
        let mut tables = self.tables.lock().await;
        tables.check(ops::UPSERT_FUNCTION)?;
        let now = Utc::now();

        if let Some(row) = tables.functions.iter_mut().find(|r| {
            r.is_live()
                && r.value.project_id == new.project_id
                && r.value.slug == new.slug
                && r.value.version == new.version
        }) {
            row.value.updated_at = now;
            return Ok(row.value.clone());
        }

        let function = Function {
            id: Uuid::new_v4(),
            project_id: new.project_id,
            name: new.name.clone(),
            description: new.description.clone(),
            slug: new.slug.clone(),
            version: new.version.clone(),
            language: new.language,
            main: new.main.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.functions.push(Row::live(function.clone()));
        Ok(function)
    }

    async fn find_function(
        &self,
        project_id: Uuid,
        slug: &str,
        version: &str,
    ) -> Result<Option<Function>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .live_functions(project_id)
            .find(|f| f.slug == slug && f.version == version)
            .cloned())
    }

    async fn find_latest_function(
        &self,
        project_id: Uuid,
        slug: &str,
    ) -> Result<Option<Function>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .live_functions(project_id)
            .filter(|f| f.slug == slug)
            .max_by_key(|f| f.updated_at)
            .cloned())
    }

    async fn list_functions(&self, project_id: Uuid) -> Result<Vec<Function>> {
        let tables = self.tables.lock().await;
        Ok(tables.live_functions(project_id).cloned().collect())
    }

    async fn database_exists(&self, project_id: Uuid, name: &str) -> Result<bool> {
        let tables = self.tables.lock().await;
        Ok(tables.live_databases(project_id).any(|d| d.name == name))
    }

    async fn create_database(&self, new: &NewDatabase) -> Result<Database> {
        self.pause(ops::CREATE_DATABASE).await;
        let mut tables = self.tables.lock().await;
        tables.check(ops::CREATE_DATABASE)?;
        if tables
            .live_databases(new.project_id)
            .any(|d| d.name == new.name)
        {
            return Err(StoreError::Conflict(format!(
                "database '{}' already exists in this project",
                new.name
            )));
        }

        let now = Utc::now();
        let database = Database {
            id: Uuid::new_v4(),
            project_id: new.project_id,
            name: new.name.clone(),
            db_type: new.db_type,
            username: new.username.clone(),
            password: new.password.clone(),
            container_id: new.container_id.clone(),
            volume_name: new.volume_name.clone(),
            image_version: new.image_version.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.databases.push(Row::live(database.clone()));
        Ok(database)
    }

    async fn find_database(&self, project_id: Uuid, id: Uuid) -> Result<Option<Database>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .live_databases(project_id)
            .find(|d| d.id == id)
            .cloned())
    }

    async fn list_databases(&self, project_id: Uuid) -> Result<Vec<Database>> {
        let tables = self.tables.lock().await;
        Ok(tables.live_databases(project_id).cloned().collect())
    }

    async fn delete_database(&self, id: Uuid) -> Result<()> {
        self.pause(ops::DELETE_DATABASE).await;
        let mut tables = self.tables.lock().await;
        tables.check(ops::DELETE_DATABASE)?;
        let row = tables
            .databases
            .iter_mut()
            .find(|r| r.is_live() && r.value.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("database {}", id)))?;
        row.deleted_at = Some(Utc::now());
        Ok(())
    }
}
