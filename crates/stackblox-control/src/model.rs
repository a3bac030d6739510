// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Data model: projects, functions, and databases.
//!
//! A [`Project`] is the tenant boundary and owns a dedicated container network.
//! [`Function`]s and [`Database`]s always belong to exactly one project.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tenant boundary owning a dedicated network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Unique project ID.
    pub id: Uuid,
    /// Normalized (kebab-case) unique project name.
    pub name: String,
    /// Name of the isolated container network, derived from the name at creation.
    pub network_name: String,
    /// When the project was created.
    pub created_at: DateTime<Utc>,
    /// When the project was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Runtime/language tag of a deployed function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    /// Node.js function packaged with a `package.json`.
    #[serde(rename = "node-js")]
    NodeJs,
}

impl Language {
    /// Stable string tag, as persisted.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::NodeJs => "node-js",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "node-js" | "nodejs" | "node" => Ok(Language::NodeJs),
            _ => Err(format!("unsupported runtime: {}", s)),
        }
    }
}

/// A deployable, versioned unit of user code.
///
/// Unique on `(slug, version, project_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Function {
    /// Unique function row ID.
    pub id: Uuid,
    /// Owning project.
    pub project_id: Uuid,
    /// Name declared in the manifest.
    pub name: String,
    /// Description declared in the manifest.
    pub description: String,
    /// Kebab-case identifier derived from the name, stable across versions.
    pub slug: String,
    /// Version declared in the manifest.
    pub version: String,
    /// Runtime tag.
    pub language: Language,
    /// Entry module declared in the manifest.
    pub main: String,
    /// When the function was first deployed.
    pub created_at: DateTime<Utc>,
    /// When the function was last (re)deployed.
    pub updated_at: DateTime<Utc>,
}

impl Function {
    /// Image reference for a given tag: `{slug}:{tag}`.
    pub fn image_ref(&self, tag: &str) -> String {
        format!("{}:{}", self.slug, tag)
    }
}

/// Database engines that can be provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    /// PostgreSQL.
    Postgres,
}

impl DbType {
    /// Stable string tag, as persisted.
    pub fn as_str(&self) -> &'static str {
        match self {
            DbType::Postgres => "postgres",
        }
    }

    /// Image repository for this engine.
    pub fn image_repository(&self) -> &'static str {
        match self {
            DbType::Postgres => "postgres",
        }
    }

    /// Image reference for an optional version; empty or missing means `latest`.
    pub fn image_ref(&self, version: Option<&str>) -> String {
        let version = version.filter(|v| !v.trim().is_empty()).unwrap_or("latest");
        format!("{}:{}", self.image_repository(), version)
    }

    /// Canonical data directory of the engine inside its container.
    pub fn data_dir(&self) -> &'static str {
        match self {
            DbType::Postgres => "/var/lib/postgresql/data",
        }
    }

    /// Container environment that initializes the engine with credentials.
    pub fn container_env(
        &self,
        database_name: &str,
        username: &str,
        password: &str,
    ) -> Vec<(String, String)> {
        match self {
            DbType::Postgres => vec![
                ("POSTGRES_DB".to_string(), database_name.to_string()),
                ("POSTGRES_USER".to_string(), username.to_string()),
                ("POSTGRES_PASSWORD".to_string(), password.to_string()),
            ],
        }
    }
}

impl std::fmt::Display for DbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DbType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" => Ok(DbType::Postgres),
            _ => Err(format!("unrecognized database type: {}", s)),
        }
    }
}

/// A provisioned database service instance.
///
/// Unique on `(name, project_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    /// Unique database row ID.
    pub id: Uuid,
    /// Owning project.
    pub project_id: Uuid,
    /// Snake-case database name.
    pub name: String,
    /// Engine type.
    #[serde(rename = "type")]
    pub db_type: DbType,
    /// Generated username.
    pub username: String,
    /// Generated password. Never serialized in API responses.
    #[serde(skip_serializing, default)]
    pub password: String,
    /// Name of the backing container (also its DNS name on the project network).
    pub container_id: String,
    /// Name of the backing volume.
    pub volume_name: String,
    /// Resolved image reference the container was started from.
    pub image_version: String,
    /// When the database was provisioned.
    pub created_at: DateTime<Utc>,
    /// When the database record was last updated.
    pub updated_at: DateTime<Utc>,
}

/// A project together with its eagerly loaded functions and databases.
///
/// Resolved fresh for every request and passed explicitly to the operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSnapshot {
    /// The project row.
    #[serde(flatten)]
    pub project: Project,
    /// All function versions deployed in the project.
    pub functions: Vec<Function>,
    /// All databases provisioned in the project.
    pub databases: Vec<Database>,
}

/// Values for a new project row.
#[derive(Debug, Clone)]
pub struct NewProject {
    /// Normalized project name.
    pub name: String,
    /// Derived network name.
    pub network_name: String,
}

/// Values for a function upsert.
#[derive(Debug, Clone)]
pub struct NewFunction {
    /// Owning project.
    pub project_id: Uuid,
    /// Declared name.
    pub name: String,
    /// Declared description.
    pub description: String,
    /// Derived slug.
    pub slug: String,
    /// Declared version.
    pub version: String,
    /// Runtime tag.
    pub language: Language,
    /// Declared entry module.
    pub main: String,
}

/// Values for a new database row.
#[derive(Debug, Clone)]
pub struct NewDatabase {
    /// Owning project.
    pub project_id: Uuid,
    /// Snake-case name.
    pub name: String,
    /// Engine type.
    pub db_type: DbType,
    /// Generated username.
    pub username: String,
    /// Generated password.
    pub password: String,
    /// Backing container name.
    pub container_id: String,
    /// Backing volume name.
    pub volume_name: String,
    /// Resolved image reference.
    pub image_version: String,
}

/// Function manifest read from the root of an uploaded archive (`package.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    /// Function name; the slug is derived from it.
    pub name: String,
    /// Human description.
    #[serde(default)]
    pub description: String,
    /// Version; becomes an image tag.
    pub version: String,
    /// Entry module the entrypoint shim loads.
    pub main: String,
    /// Explicit runtime tag, overriding inference from the manifest file.
    #[serde(default)]
    pub runtime: Option<String>,
}
