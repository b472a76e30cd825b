//! Table registry
//!
//! Resolves a meta type (`post`, `widget`, ...) to the physical table that
//! backs it. A registry is immutable once built; it can be passed around by
//! reference or installed once as the process-wide instance.

use altmeta_common::{Config, Error, MetaType, Result};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

static GLOBAL: OnceLock<TableRegistry> = OnceLock::new();

/// A resolved metadata table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetaTable {
    meta_type: MetaType,
    name: String,
    id_column: String,
    index_name: String,
}

impl MetaTable {
    fn new(prefix: &str, meta_type: MetaType) -> Self {
        let name = format!("{prefix}{meta_type}meta");
        let id_column = format!("{meta_type}_id");
        let index_name = format!("{name}__{id_column}");
        Self {
            meta_type,
            name,
            id_column,
            index_name,
        }
    }

    /// Meta type this table belongs to
    #[must_use]
    pub const fn meta_type(&self) -> &MetaType {
        &self.meta_type
    }

    /// Fully-qualified table name, e.g. `wp_widgetmeta`
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the entity column, e.g. `widget_id`
    #[must_use]
    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    /// Name of the entity index table
    #[must_use]
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Accessor the generic engine looks the table up by, e.g. `widgetmeta`
    #[must_use]
    pub fn accessor(&self) -> String {
        format!("{}meta", self.meta_type)
    }
}

/// Mapping from meta type to its table
#[derive(Clone, Debug)]
pub struct TableRegistry {
    prefix: String,
    tables: BTreeMap<String, MetaTable>,
}

impl TableRegistry {
    /// Start building a registry whose tables share `prefix`
    pub fn builder(prefix: impl Into<String>) -> TableRegistryBuilder {
        TableRegistryBuilder {
            prefix: prefix.into(),
            tables: BTreeMap::new(),
        }
    }

    /// Register every meta type named by the configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut builder = Self::builder(config.storage.table_prefix.as_str());
        for meta_type in config.meta_types() {
            builder = builder.register(meta_type.as_str())?;
        }
        Ok(builder.build())
    }

    /// Install as the process-wide registry. Only the first call succeeds.
    pub fn install(self) -> Result<&'static Self> {
        let mut installed = false;
        let registry = GLOBAL.get_or_init(|| {
            installed = true;
            self
        });
        if installed {
            debug!("Installed table registry with {} tables", registry.len());
            Ok(registry)
        } else {
            Err(Error::RegistryAlreadyInstalled)
        }
    }

    /// The process-wide registry, if one was installed
    #[must_use]
    pub fn global() -> Option<&'static Self> {
        GLOBAL.get()
    }

    /// Table prefix shared by all tables
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Resolve a meta type to its table
    #[must_use]
    pub fn resolve(&self, meta_type: &str) -> Option<&MetaTable> {
        self.tables.get(meta_type)
    }

    /// Resolve an accessor name (`widgetmeta`) to its table
    #[must_use]
    pub fn resolve_accessor(&self, accessor: &str) -> Option<&MetaTable> {
        accessor
            .strip_suffix("meta")
            .and_then(|meta_type| self.resolve(meta_type))
    }

    /// Check if a meta type is registered
    #[must_use]
    pub fn contains(&self, meta_type: &str) -> bool {
        self.tables.contains_key(meta_type)
    }

    /// All registered tables, ordered by meta type
    pub fn tables(&self) -> impl Iterator<Item = &MetaTable> {
        self.tables.values()
    }

    /// Number of registered tables
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Check if nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Builder for [`TableRegistry`]
#[derive(Debug)]
pub struct TableRegistryBuilder {
    prefix: String,
    tables: BTreeMap<String, MetaTable>,
}

impl TableRegistryBuilder {
    /// Register a meta type. Registering the same type twice is a no-op.
    pub fn register(mut self, meta_type: &str) -> Result<Self> {
        let meta_type = MetaType::new(meta_type)?;
        let key = meta_type.as_str().to_string();
        let table = MetaTable::new(&self.prefix, meta_type);
        self.tables.entry(key).or_insert(table);
        Ok(self)
    }

    /// Freeze the registry
    #[must_use]
    pub fn build(self) -> TableRegistry {
        TableRegistry {
            prefix: self.prefix,
            tables: self.tables,
        }
    }
}
