//! SurrealDB connection handling
//!
//! Supports in-memory, cloud (WebSocket) and local file-backed connections.
//! Every connection selects its namespace/database and runs the schema
//! migrations before it is handed out.

use std::path::Path;

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{info, instrument};

use crate::error::StateError;
use crate::migrations;
use crate::Result;

/// Default namespace for Gradebox tables
pub const DEFAULT_NAMESPACE: &str = "gradebox";
/// Default database name
pub const DEFAULT_DATABASE: &str = "main";

/// Configuration for SurrealDB Cloud connection
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// WebSocket endpoint URL (e.g., "wss://xxx.aws-use1.surrealdb.cloud")
    pub endpoint: String,
    /// Database username
    pub username: String,
    /// Database password
    pub password: String,
    /// Namespace (default: "gradebox")
    pub namespace: String,
    /// Database name (default: "main")
    pub database: String,
    /// Whether this is a root user (true) or database user (false)
    pub is_root: bool,
}

impl CloudConfig {
    /// Create a new cloud configuration for a database user
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            is_root: false,
        }
    }

    /// Set custom namespace
    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    /// Set custom database
    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    /// Set whether this is a root user
    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    /// Create from environment variables
    ///
    /// Reads `SURREALDB_ENDPOINT`, `SURREALDB_USERNAME` and
    /// `SURREALDB_PASSWORD` (required), plus `SURREALDB_NAMESPACE`,
    /// `SURREALDB_DATABASE` and `SURREALDB_ROOT` ("true" for root users).
    pub fn from_env() -> std::result::Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> std::result::Result<Self, String> {
        let required = |key: &str| lookup(key).ok_or_else(|| format!("{} not set", key));

        let mut config = Self::new(
            required("SURREALDB_ENDPOINT")?,
            required("SURREALDB_USERNAME")?,
            required("SURREALDB_PASSWORD")?,
        );
        if let Some(ns) = lookup("SURREALDB_NAMESPACE") {
            config.namespace = ns;
        }
        if let Some(db) = lookup("SURREALDB_DATABASE") {
            config.database = db;
        }
        config.is_root = lookup("SURREALDB_ROOT").is_some_and(|v| v.eq_ignore_ascii_case("true"));
        Ok(config)
    }
}

/// Connect to an in-memory database.
pub async fn connect_in_memory() -> Result<Surreal<Any>> {
    connect_url("mem://").await
}

/// Connect to SurrealDB Cloud and authenticate.
#[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database))]
pub async fn connect_cloud(config: &CloudConfig) -> Result<Surreal<Any>> {
    info!("Connecting to SurrealDB Cloud (root={})", config.is_root);

    let db = surrealdb::engine::any::connect(&config.endpoint)
        .await
        .map_err(|e| {
            StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
        })?;

    if config.is_root {
        db.signin(Root {
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("Root authentication failed: {}", e)))?;
    } else {
        db.signin(Database {
            namespace: &config.namespace,
            database: &config.database,
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("Database authentication failed: {}", e)))?;
    }

    db.use_ns(&config.namespace)
        .use_db(&config.database)
        .await
        .map_err(|e| StateError::Connection(format!("Failed to select namespace/database: {}", e)))?;

    migrations::init_schema(&db).await?;
    Ok(db)
}

/// Connect using the environment.
///
/// Order of precedence: cloud config (`SURREALDB_ENDPOINT` + credentials),
/// then `SURREALDB_URL`, then local persistence under `local_dir`.
pub async fn connect_from_env(local_dir: &Path) -> Result<Surreal<Any>> {
    if let Ok(config) = CloudConfig::from_env() {
        info!("Cloud config found, connecting to SurrealDB Cloud");
        return connect_cloud(&config).await;
    }

    if let Ok(url) = std::env::var("SURREALDB_URL") {
        info!("SURREALDB_URL found, connecting to {}", url);
        return connect_url(&url).await;
    }

    std::fs::create_dir_all(local_dir).map_err(|e| {
        StateError::Connection(format!(
            "Failed to create database directory {}: {}",
            local_dir.display(),
            e
        ))
    })?;
    let url = format!("surrealkv://{}", local_dir.display());
    info!(
        "No cloud config or SURREALDB_URL found, using local persistence: {}",
        url
    );
    connect_url(&url).await
}

async fn connect_url(url: &str) -> Result<Surreal<Any>> {
    let db = surrealdb::engine::any::connect(url)
        .await
        .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

    db.use_ns(DEFAULT_NAMESPACE)
        .use_db(DEFAULT_DATABASE)
        .await
        .map_err(|e| StateError::Connection(e.to_string()))?;

    migrations::init_schema(&db).await?;
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloud_config_defaults() {
        let config = CloudConfig::new("wss://db.example", "user", "pass");
        assert_eq!(config.namespace, "gradebox");
        assert_eq!(config.database, "main");
        assert!(!config.is_root);

        let root = config.with_root(true).with_namespace("ns").with_database("db");
        assert!(root.is_root);
        assert_eq!(root.namespace, "ns");
        assert_eq!(root.database, "db");
    }

    #[test]
    fn cloud_config_from_lookup() {
        let vars = std::collections::HashMap::from([
            ("SURREALDB_ENDPOINT", "wss://db.example"),
            ("SURREALDB_USERNAME", "grader"),
            ("SURREALDB_PASSWORD", "pw"),
            ("SURREALDB_ROOT", "TRUE"),
        ]);
        let config =
            CloudConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.endpoint, "wss://db.example");
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
        assert!(config.is_root);

        let err = CloudConfig::from_lookup(|_| None).unwrap_err();
        assert_eq!(err, "SURREALDB_ENDPOINT not set");
    }
}
