//! Configuration types for AltMeta
//!
//! Loaded from an optional TOML file with `ALTMETA__` environment
//! overrides, e.g. `ALTMETA__STORAGE__PATH=/tmp/meta.redb`.

use crate::error::{Error, Result};
use crate::types::MetaType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "ALTMETA";

/// Root configuration for AltMeta
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration
    pub storage: StorageConfig,
    /// Alternate tables and what they intercept
    pub routers: Vec<RouterConfig>,
    /// Logging configuration
    pub logging: LogConfig,
}

impl Config {
    /// Load configuration from `path` (if given and present) layered
    /// under environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .map_err(|e| Error::configuration(e.to_string()))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| Error::configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check meta type names and router uniqueness
    pub fn validate(&self) -> Result<()> {
        let mut hosts = HashSet::new();
        for host in &self.storage.host_types {
            MetaType::new(host.as_str())?;
            hosts.insert(host.as_str());
        }
        for host in self.routers.iter().filter_map(|r| r.host_type.as_deref()) {
            MetaType::new(host)?;
            hosts.insert(host);
        }

        let mut seen = HashSet::new();
        for router in &self.routers {
            MetaType::new(router.alternate_type.as_str())?;
            if !seen.insert(router.alternate_type.as_str()) {
                return Err(Error::configuration(format!(
                    "duplicate alternate type '{}'",
                    router.alternate_type
                )));
            }
            if hosts.contains(router.alternate_type.as_str()) {
                return Err(Error::configuration(format!(
                    "alternate type '{}' is also a host type",
                    router.alternate_type
                )));
            }
        }
        Ok(())
    }

    /// Every meta type that needs a table: hosts, router hosts and
    /// alternate types.
    #[must_use]
    pub fn meta_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.storage.host_types.clone();
        for router in &self.routers {
            if let Some(host) = &router.host_type {
                types.push(host.clone());
            }
            types.push(router.alternate_type.clone());
        }
        let mut seen = HashSet::new();
        types.retain(|t| seen.insert(t.clone()));
        types
    }
}

/// Storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the redb database file
    pub path: PathBuf,
    /// Prefix prepended to every table name
    pub table_prefix: String,
    /// Host types whose default metadata tables are managed here
    pub host_types: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/altmeta/meta.redb"),
            table_prefix: "wp_".to_string(),
            host_types: vec!["post".to_string()],
        }
    }
}

/// One alternate metadata table
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Table namespace, also the key prefix (`{alternate_type}_`)
    pub alternate_type: String,
    /// Entity type whose metadata calls are intercepted
    #[serde(default)]
    pub host_type: Option<String>,
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
