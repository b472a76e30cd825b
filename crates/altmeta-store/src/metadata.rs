//! Generic metadata capability
//!
//! Every metadata backend (the shared table of a host type, or an
//! alternate table) exposes the same four verbs plus the per-row paths
//! the deletion cascade relies on.

use altmeta_common::{EntityId, MetaId, MetaLookup, MetaRow, MetaValue, Result, UpdateOutcome};

/// Metadata store for a single meta type
pub trait MetadataStore: Send + Sync {
    /// Meta type this store serves
    fn meta_type(&self) -> &str;

    /// Add a value. Returns `None` when `unique` is set and the entity
    /// already has a value for `key`.
    fn add(
        &self,
        entity_id: EntityId,
        key: &str,
        value: &MetaValue,
        unique: bool,
    ) -> Result<Option<MetaId>>;

    /// Update-or-insert. With `prev_value`, only rows holding exactly that
    /// value are rewritten.
    fn update(
        &self,
        entity_id: EntityId,
        key: &str,
        value: &MetaValue,
        prev_value: Option<&MetaValue>,
    ) -> Result<UpdateOutcome>;

    /// Delete rows for `key`. With `value`, only rows holding that value;
    /// with `delete_all`, for every entity. Returns whether anything went.
    fn delete(
        &self,
        entity_id: EntityId,
        key: &str,
        value: Option<&MetaValue>,
        delete_all: bool,
    ) -> Result<bool>;

    /// Read values for `key`, or everything for the entity when `key` is empty
    fn get(&self, entity_id: EntityId, key: &str, single: bool) -> Result<MetaLookup>;

    /// Read a single row
    fn get_by_meta_id(&self, meta_id: MetaId) -> Result<Option<MetaRow>>;

    /// Delete a single row, running the same per-row side effects as `delete`
    fn delete_by_meta_id(&self, meta_id: MetaId) -> Result<bool>;

    /// Every row id belonging to an entity
    fn meta_ids_for_entity(&self, entity_id: EntityId) -> Result<Vec<MetaId>>;
}

/// Per-row change notifications, fired after the change is committed
pub trait MetaObserver: Send + Sync {
    fn on_added(&self, _meta_type: &str, _row: &MetaRow) {}

    fn on_updated(&self, _meta_type: &str, _row: &MetaRow) {}

    fn on_deleted(&self, _meta_type: &str, _row: &MetaRow) {}
}
