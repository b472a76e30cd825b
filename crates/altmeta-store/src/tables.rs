//! Redb table definitions for persistent metadata storage.
//!
//! Every registered meta type owns two tables whose names derive from its
//! qualified table name; the sequence table is shared.

use crate::registry::MetaTable;
use redb::{MultimapTableDefinition, TableDefinition};

// Key: qualified table name, Value: last meta_id handed out for that table
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("__sequences");

/// Rows of a meta table. Key: meta_id, Value: bincode-encoded `StoredMetaRow`
#[must_use]
pub fn rows(table: &MetaTable) -> TableDefinition<'_, u64, &'static [u8]> {
    TableDefinition::new(table.name())
}

/// Entity index of a meta table. Key: `{type}_id`, Values: meta_ids
#[must_use]
pub fn entity_index(table: &MetaTable) -> MultimapTableDefinition<'_, u64, u64> {
    MultimapTableDefinition::new(table.index_name())
}
