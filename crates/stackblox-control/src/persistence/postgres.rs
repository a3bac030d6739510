// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL store.
//!
//! Each operation is a free function over a `PgPool`; [`PostgresStore`]
//! delegates to them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{Result, Store, StoreError};
use crate::model::{Database, Function, NewDatabase, NewFunction, NewProject, Project};

#[derive(Debug, Clone, sqlx::FromRow)]
struct ProjectRow {
    id: Uuid,
    name: String,
    network_name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Project {
            id: row.id,
            name: row.name,
            network_name: row.network_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct FunctionRow {
    id: Uuid,
    project_id: Uuid,
    name: String,
    description: String,
    slug: String,
    version: String,
    language: String,
    main: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FunctionRow> for Function {
    type Error = StoreError;

    fn try_from(row: FunctionRow) -> Result<Self> {
        Ok(Function {
            id: row.id,
            project_id: row.project_id,
            name: row.name,
            description: row.description,
            slug: row.slug,
            version: row.version,
            language: row.language.parse().map_err(StoreError::Corrupt)?,
            main: row.main,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct DatabaseRow {
    id: Uuid,
    project_id: Uuid,
    name: String,
    db_type: String,
    username: String,
    password: String,
    container_id: String,
    volume_name: String,
    image_version: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DatabaseRow> for Database {
    type Error = StoreError;

    fn try_from(row: DatabaseRow) -> Result<Self> {
        Ok(Database {
            id: row.id,
            project_id: row.project_id,
            name: row.name,
            db_type: row.db_type.parse().map_err(StoreError::Corrupt)?,
            username: row.username,
            password: row.password,
            container_id: row.container_id,
            volume_name: row.volume_name,
            image_version: row.image_version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const PROJECT_COLUMNS: &str = "id, name, network_name, created_at, updated_at";
const FUNCTION_COLUMNS: &str =
    "id, project_id, name, description, slug, version, language, main, created_at, updated_at";
const DATABASE_COLUMNS: &str = "id, project_id, name, db_type, username, password, container_id, volume_name, image_version, created_at, updated_at";

/// Map a unique violation to `Conflict`, everything else to `Database`.
fn map_unique(err: sqlx::Error, conflict: impl FnOnce() -> String) -> StoreError {
    if let sqlx::Error::Database(db) = &err
        && db.is_unique_violation()
    {
        return StoreError::Conflict(conflict());
    }
    StoreError::Database(err)
}

/// Insert a project.
pub async fn create_project(pool: &PgPool, new: &NewProject) -> Result<Project> {
    let row = sqlx::query_as::<_, ProjectRow>(&format!(
        r#"
        INSERT INTO projects (id, name, network_name, created_at, updated_at)
        VALUES ($1, $2, $3, NOW(), NOW())
        RETURNING {PROJECT_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(&new.name)
    .bind(&new.network_name)
    .fetch_one(pool)
    .await
    .map_err(|e| map_unique(e, || format!("project '{}' already exists", new.name)))?;

    Ok(row.into())
}

/// Get a live project by ID.
pub async fn find_project(pool: &PgPool, id: Uuid) -> Result<Option<Project>> {
    let row = sqlx::query_as::<_, ProjectRow>(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1 AND deleted_at IS NULL"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Project::from))
}

/// Get a live project by name.
pub async fn find_project_by_name(pool: &PgPool, name: &str) -> Result<Option<Project>> {
    let row = sqlx::query_as::<_, ProjectRow>(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects WHERE name = $1 AND deleted_at IS NULL"
    ))
    .bind(name)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Project::from))
}

/// List live projects, oldest first.
pub async fn list_projects(pool: &PgPool) -> Result<Vec<Project>> {
    let rows = sqlx::query_as::<_, ProjectRow>(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects WHERE deleted_at IS NULL ORDER BY created_at, name"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Project::from).collect())
}

/// Rename a live project.
pub async fn rename_project(pool: &PgPool, id: Uuid, name: &str) -> Result<Project> {
    let row = sqlx::query_as::<_, ProjectRow>(&format!(
        r#"
        UPDATE projects
        SET name = $2, updated_at = NOW()
        WHERE id = $1 AND deleted_at IS NULL
        RETURNING {PROJECT_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(name)
    .fetch_optional(pool)
    .await
    .map_err(|e| map_unique(e, || format!("project '{}' already exists", name)))?;

    row.map(Project::from)
        .ok_or_else(|| StoreError::NotFound(format!("project {}", id)))
}

/// Soft-delete a project together with its function and database rows.
pub async fn delete_project(pool: &PgPool, id: Uuid) -> Result<()> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        "UPDATE projects SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!("project {}", id)));
    }

    sqlx::query(
        "UPDATE functions SET deleted_at = NOW() WHERE project_id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE databases SET deleted_at = NOW() WHERE project_id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Insert a function version or refresh the timestamp of the existing row.
pub async fn upsert_function(pool: &PgPool, new: &NewFunction) -> Result<Function> {
    sqlx::query(
        r#"
        INSERT INTO functions
            (id, project_id, name, description, slug, version, language, main, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
        ON CONFLICT (slug, version, project_id) WHERE deleted_at IS NULL
        DO UPDATE SET updated_at = NOW()
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(new.project_id)
    .bind(&new.name)
    .bind(&new.description)
    .bind(&new.slug)
    .bind(&new.version)
    .bind(new.language.as_str())
    .bind(&new.main)
    .execute(pool)
    .await?;

    find_function(pool, new.project_id, &new.slug, &new.version)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("function {}:{}", new.slug, new.version)))
}

/// Get one live function version.
pub async fn find_function(
    pool: &PgPool,
    project_id: Uuid,
    slug: &str,
    version: &str,
) -> Result<Option<Function>> {
    let row = sqlx::query_as::<_, FunctionRow>(&format!(
        r#"
        SELECT {FUNCTION_COLUMNS} FROM functions
        WHERE project_id = $1 AND slug = $2 AND version = $3 AND deleted_at IS NULL
        "#
    ))
    .bind(project_id)
    .bind(slug)
    .bind(version)
    .fetch_optional(pool)
    .await?;

    row.map(Function::try_from).transpose()
}

/// Get the most recently deployed live version of a function.
pub async fn find_latest_function(
    pool: &PgPool,
    project_id: Uuid,
    slug: &str,
) -> Result<Option<Function>> {
    let row = sqlx::query_as::<_, FunctionRow>(&format!(
        r#"
        SELECT {FUNCTION_COLUMNS} FROM functions
        WHERE project_id = $1 AND slug = $2 AND deleted_at IS NULL
        ORDER BY updated_at DESC
        LIMIT 1
        "#
    ))
    .bind(project_id)
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    row.map(Function::try_from).transpose()
}

/// List live functions of a project.
pub async fn list_functions(pool: &PgPool, project_id: Uuid) -> Result<Vec<Function>> {
    let rows = sqlx::query_as::<_, FunctionRow>(&format!(
        r#"
        SELECT {FUNCTION_COLUMNS} FROM functions
        WHERE project_id = $1 AND deleted_at IS NULL
        ORDER BY created_at, slug, version
        "#
    ))
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Function::try_from).collect()
}

/// Whether a live database with this name exists in the project.
pub async fn database_exists(pool: &PgPool, project_id: Uuid, name: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM databases WHERE project_id = $1 AND name = $2 AND deleted_at IS NULL",
    )
    .bind(project_id)
    .bind(name)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

/// Insert a database.
pub async fn create_database(pool: &PgPool, new: &NewDatabase) -> Result<Database> {
    let row = sqlx::query_as::<_, DatabaseRow>(&format!(
        r#"
        INSERT INTO databases
            (id, project_id, name, db_type, username, password, container_id, volume_name,
             image_version, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW())
        RETURNING {DATABASE_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(new.project_id)
    .bind(&new.name)
    .bind(new.db_type.as_str())
    .bind(&new.username)
    .bind(&new.password)
    .bind(&new.container_id)
    .bind(&new.volume_name)
    .bind(&new.image_version)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        map_unique(e, || {
            format!("database '{}' already exists in this project", new.name)
        })
    })?;

    row.try_into()
}

/// Get a live database of a project.
pub async fn find_database(pool: &PgPool, project_id: Uuid, id: Uuid) -> Result<Option<Database>> {
    let row = sqlx::query_as::<_, DatabaseRow>(&format!(
        "SELECT {DATABASE_COLUMNS} FROM databases WHERE project_id = $1 AND id = $2 AND deleted_at IS NULL"
    ))
    .bind(project_id)
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(Database::try_from).transpose()
}

/// List live databases of a project.
pub async fn list_databases(pool: &PgPool, project_id: Uuid) -> Result<Vec<Database>> {
    let rows = sqlx::query_as::<_, DatabaseRow>(&format!(
        "SELECT {DATABASE_COLUMNS} FROM databases WHERE project_id = $1 AND deleted_at IS NULL ORDER BY created_at, name"
    ))
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Database::try_from).collect()
}

/// Soft-delete a database.
pub async fn delete_database(pool: &PgPool, id: Uuid) -> Result<()> {
    let result =
        sqlx::query("UPDATE databases SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .execute(pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!("database {}", id)));
    }
    Ok(())
}

/// PostgreSQL-backed [`Store`].
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn create_project(&self, new: &NewProject) -> Result<Project> {
        create_project(&self.pool, new).await
    }

    async fn find_project(&self, id: Uuid) -> Result<Option<Project>> {
        find_project(&self.pool, id).await
    }

    async fn find_project_by_name(&self, name: &str) -> Result<Option<Project>> {
        find_project_by_name(&self.pool, name).await
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        list_projects(&self.pool).await
    }

    async fn rename_project(&self, id: Uuid, name: &str) -> Result<Project> {
        rename_project(&self.pool, id, name).await
    }

    async fn delete_project(&self, id: Uuid) -> Result<()> {
        delete_project(&self.pool, id).await
    }

    async fn upsert_function(&self, new: &NewFunction) -> Result<Function> {
        upsert_function(&self.pool, new).await
    }

    async fn find_function(
        &self,
        project_id: Uuid,
        slug: &str,
        version: &str,
    ) -> Result<Option<Function>> {
        find_function(&self.pool, project_id, slug, version).await
    }

    async fn find_latest_function(
        &self,
        project_id: Uuid,
        slug: &str,
    ) -> Result<Option<Function>> {
        find_latest_function(&self.pool, project_id, slug).await
    }

    async fn list_functions(&self, project_id: Uuid) -> Result<Vec<Function>> {
        list_functions(&self.pool, project_id).await
    }

    async fn database_exists(&self, project_id: Uuid, name: &str) -> Result<bool> {
        database_exists(&self.pool, project_id, name).await
    }

    async fn create_database(&self, new: &NewDatabase) -> Result<Database> {
        create_database(&self.pool, new).await
    }

    async fn find_database(&self, project_id: Uuid, id: Uuid) -> Result<Option<Database>> {
        find_database(&self.pool, project_id, id).await
    }

    async fn list_databases(&self, project_id: Uuid) -> Result<Vec<Database>> {
        list_databases(&self.pool, project_id).await
    }

    async fn delete_database(&self, id: Uuid) -> Result<()> {
        delete_database(&self.pool, id).await
    }
}
