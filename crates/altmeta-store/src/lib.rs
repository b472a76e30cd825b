//! AltMeta Metadata Store - redb-backed generic metadata engine
//!
//! This crate implements the add/update/delete/get metadata verbs over
//! per-type meta tables, the registry that resolves a meta type to its
//! table, and the SQL definition of those tables.

pub mod metadata;
pub mod registry;
pub mod schema;
pub mod store;
pub mod tables;
pub mod types;

// Re-exports
pub use metadata::{MetaObserver, MetadataStore};
pub use registry::{MetaTable, TableRegistry};
pub use store::{MetaDatabase, MetaStore, StoreError};
