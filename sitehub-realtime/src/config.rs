//! Realtime configuration.
//!
//! The registry only needs to know where the backend lives and which tables
//! and columns the three row-change feeds watch. A config without an
//! endpoint or key is "unconfigured" and selects the null transport.

use serde::{Deserialize, Serialize};

/// Environment variable holding the realtime endpoint URL.
pub const ENV_URL: &str = "SITEHUB_REALTIME_URL";
/// Environment variable holding the anonymous API key.
pub const ENV_KEY: &str = "SITEHUB_REALTIME_KEY";
/// Environment variable overriding the database schema.
pub const ENV_SCHEMA: &str = "SITEHUB_REALTIME_SCHEMA";

/// Table and column names used to build row-change filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Notification records, filtered by owner.
    pub notifications: String,
    /// Column on `notifications` that holds the owner id.
    pub owner_column: String,
    /// Task records, filtered by project.
    pub tasks: String,
    /// Column on `tasks` that references the project.
    pub project_column: String,
    /// Project records, filtered by primary key.
    pub projects: String,
    /// Primary key column on `projects`.
    pub id_column: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            notifications: "notifications".to_string(),
            owner_column: "user_id".to_string(),
            tasks: "tasks".to_string(),
            project_column: "project_id".to_string(),
            projects: "projects".to_string(),
            id_column: "id".to_string(),
        }
    }
}

/// Realtime client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Backend realtime endpoint (None = unconfigured)
    pub endpoint: Option<String>,
    /// API key presented by the transport (None = unconfigured)
    pub api_key: Option<String>,
    /// Database schema for row-change feeds
    pub schema: String,
    /// Tables and filter columns
    pub tables: TableConfig,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            schema: "public".to_string(),
            tables: TableConfig::default(),
        }
    }
}

impl RealtimeConfig {
    /// Config pointing at the given endpoint, with default tables.
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Read the endpoint, key and schema from the process environment.
    ///
    /// Missing or blank variables leave the corresponding field unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self {
            endpoint: read(ENV_URL),
            api_key: read(ENV_KEY),
            ..Self::default()
        };
        if let Some(schema) = read(ENV_SCHEMA) {
            config.schema = schema;
        }
        config
    }

    /// Whether both the endpoint and the key are present.
    pub fn is_configured(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.endpoint) && present(&self.api_key)
    }
}
