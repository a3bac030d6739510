// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Environment projection.
//!
//! A function container discovers its sibling resources only through
//! environment variables. Each resource type states which of its fields are
//! exported by implementing [`Exportable`]; [`project`] turns a collection of
//! resources into `{PREFIX}_{RESOURCE}_{FIELD}` entries.
//!
//! Host and port are not projected: siblings are reachable by container name
//! over the project network.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::model::{Database, Function, ProjectSnapshot};
use crate::naming::to_screaming_snake_case;

/// Prefix for variables describing sibling functions.
pub const FUNCTION_PREFIX: &str = "FUNC";

/// Prefix for variables describing sibling databases.
pub const DATABASE_PREFIX: &str = "DB";

/// A resource that exposes some of its fields to workloads in its project.
pub trait Exportable {
    /// Name identifying this resource within its project.
    fn export_name(&self) -> &str;

    /// Exported fields as `(snake_case_field, value)` pairs, in a fixed order.
    ///
    /// Fields not listed here never reach a workload's environment.
    fn exported_fields(&self) -> Vec<(&'static str, String)>;
}

fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl Exportable for Function {
    fn export_name(&self) -> &str {
        &self.name
    }

    fn exported_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone()),
            ("description", self.description.clone()),
            ("function_id", self.slug.clone()),
            ("version", self.version.clone()),
            ("created_at", timestamp(&self.created_at)),
            ("updated_at", timestamp(&self.updated_at)),
        ]
    }
}

impl Exportable for Database {
    fn export_name(&self) -> &str {
        &self.name
    }

    fn exported_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone()),
            ("type", self.db_type.to_string()),
            ("username", self.username.clone()),
            ("password", self.password.clone()),
            ("container_id", self.container_id.clone()),
            ("created_at", timestamp(&self.created_at)),
            ("updated_at", timestamp(&self.updated_at)),
        ]
    }
}

/// Environment key for one exported field.
pub fn env_key(prefix: &str, resource_name: &str, field: &str) -> String {
    format!(
        "{}_{}_{}",
        prefix,
        to_screaming_snake_case(resource_name),
        to_screaming_snake_case(field)
    )
}

/// Project a collection of resources into environment entries.
///
/// Entries follow resource order, then field order.
pub fn project<'a, T, I>(prefix: &str, resources: I) -> Vec<(String, String)>
where
    T: Exportable + 'a,
    I: IntoIterator<Item = &'a T>,
{
    resources
        .into_iter()
        .flat_map(|resource| {
            let name = resource.export_name().to_string();
            resource
                .exported_fields()
                .into_iter()
                .map(move |(field, value)| (env_key(prefix, &name, field), value))
        })
        .collect()
}

/// Full environment for a workload running inside `snapshot`'s project.
///
/// When several versions of a function are deployed only the most recently
/// deployed one is projected, so every key appears once.
pub fn project_snapshot(snapshot: &ProjectSnapshot) -> Vec<(String, String)> {
    let mut latest: Vec<&Function> = Vec::new();
    for function in &snapshot.functions {
        match latest.iter_mut().find(|f| f.slug == function.slug) {
            Some(existing) if existing.updated_at < function.updated_at => *existing = function,
            Some(_) => {}
            None => latest.push(function),
        }
    }

    let mut env = project(FUNCTION_PREFIX, latest);
    env.extend(project(DATABASE_PREFIX, &snapshot.databases));
    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DbType, Language, Project};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn function(name: &str, version: &str, day: u32) -> Function {
        let ts = Utc.with_ymd_and_hms(2025, 1, day, 12, 0, 0).unwrap();
        Function {
            id: Uuid::new_v4(),
            project_id: Uuid::nil(),
            name: name.to_string(),
            description: "says hello".to_string(),
            slug: crate::naming::to_kebab_case(name),
            version: version.to_string(),
            language: Language::NodeJs,
            main: "index.js".to_string(),
            created_at: ts,
            updated_at: ts,
        }
    }

    fn database(name: &str) -> Database {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        Database {
            id: Uuid::new_v4(),
            project_id: Uuid::nil(),
            name: name.to_string(),
            db_type: DbType::Postgres,
            username: "uabc123xyz".to_string(),
            password: "c2VjcmV0c2VjcmV0c2VjcmV0".to_string(),
            container_id: "db_cabc".to_string(),
            volume_name: "vol_db_cabc".to_string(),
            image_version: "postgres:latest".to_string(),
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn test_key_shapes() {
        let functions = vec![function("hello", "1.0.0", 1)];
        let databases = vec![database("orders_db")];

        let func_env = project(FUNCTION_PREFIX, &functions);
        let db_env = project(DATABASE_PREFIX, &databases);

        let func_keys: Vec<&str> = func_env.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            func_keys,
            vec![
                "FUNC_HELLO_NAME",
                "FUNC_HELLO_DESCRIPTION",
                "FUNC_HELLO_FUNCTION_ID",
                "FUNC_HELLO_VERSION",
                "FUNC_HELLO_CREATED_AT",
                "FUNC_HELLO_UPDATED_AT",
            ]
        );

        let db_keys: Vec<&str> = db_env.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            db_keys,
            vec![
                "DB_ORDERS_DB_NAME",
                "DB_ORDERS_DB_TYPE",
                "DB_ORDERS_DB_USERNAME",
                "DB_ORDERS_DB_PASSWORD",
                "DB_ORDERS_DB_CONTAINER_ID",
                "DB_ORDERS_DB_CREATED_AT",
                "DB_ORDERS_DB_UPDATED_AT",
            ]
        );
    }

    #[test]
    fn test_unexported_fields_are_absent() {
        let env = project(DATABASE_PREFIX, &[database("orders_db")]);
        assert!(env.iter().all(|(k, _)| !k.ends_with("_VOLUME_NAME")));
        assert!(env.iter().all(|(k, _)| !k.ends_with("_IMAGE_VERSION")));
        assert!(env.iter().all(|(k, _)| !k.ends_with("_PROJECT_ID")));

        let env = project(FUNCTION_PREFIX, &[function("hello", "1.0.0", 1)]);
        assert!(env.iter().all(|(k, _)| !k.ends_with("_MAIN")));
        assert!(env.iter().all(|(k, _)| !k.ends_with("_LANGUAGE")));
    }

    #[test]
    fn test_values() {
        let env = project(DATABASE_PREFIX, &[database("orders_db")]);
        let get = |key: &str| {
            env.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(get("DB_ORDERS_DB_TYPE"), "postgres");
        assert_eq!(get("DB_ORDERS_DB_USERNAME"), "uabc123xyz");
        assert_eq!(get("DB_ORDERS_DB_CONTAINER_ID"), "db_cabc");
        assert_eq!(get("DB_ORDERS_DB_CREATED_AT"), "2025-01-01T12:00:00Z");
    }

    #[test]
    fn test_snapshot_projects_latest_version_once() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let snapshot = ProjectSnapshot {
            project: Project {
                id: Uuid::nil(),
                name: "demo".to_string(),
                network_name: "net_demo".to_string(),
                created_at: ts,
                updated_at: ts,
            },
            functions: vec![function("hello", "1.0.0", 1), function("hello", "2.0.0", 2)],
            databases: vec![database("orders_db")],
        };

        let env = project_snapshot(&snapshot);
        let versions: Vec<&str> = env
            .iter()
            .filter(|(k, _)| k == "FUNC_HELLO_VERSION")
            .map(|(_, v)| v.as_str())
            .collect();
        assert_eq!(versions, vec!["2.0.0"]);
        assert!(env.iter().any(|(k, _)| k == "DB_ORDERS_DB_PASSWORD"));
    }
}
