//! Persistent metadata store backed by redb.
//!
//! One database holds every registered meta table. Each metadata verb runs
//! in exactly one read or write transaction; a write transaction that ends
//! up changing nothing is dropped instead of committed.

use crate::metadata::{MetaObserver, MetadataStore};
use crate::registry::{MetaTable, TableRegistry};
use crate::tables;
use crate::types::StoredMetaRow;
use altmeta_common::{
    EntityId, Error, MetaId, MetaLookup, MetaRow, MetaValue, Result, UpdateOutcome,
};
use parking_lot::RwLock;
use redb::{Database, MultimapTable, ReadableMultimapTable, ReadableTable, Table};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Error type for redb-level store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redb::TransactionError> for StoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Io(e) => Self::Io(e),
            StoreError::Json(e) => Self::from(e),
            StoreError::Bincode(e) => Self::Serialization(e.to_string()),
            other => Self::Storage(other.to_string()),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

type RowsTable<'txn> = Table<'txn, u64, &'static [u8]>;
type IndexTable<'txn> = MultimapTable<'txn, u64, u64>;

struct Shared {
    db: Database,
    registry: TableRegistry,
    observers: RwLock<Vec<Arc<dyn MetaObserver>>>,
}

/// A redb database holding every registered meta table
#[derive(Clone)]
pub struct MetaDatabase {
    shared: Arc<Shared>,
}

impl MetaDatabase {
    /// Open (or create) the database at `path` and create every table in
    /// `registry`. Safe to call on an existing database.
    pub fn open(path: impl AsRef<Path>, registry: &TableRegistry) -> Result<Self> {
        Ok(Self::open_inner(path.as_ref(), registry)?)
    }

    fn open_inner(path: &Path, registry: &TableRegistry) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Create all tables eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(tables::SEQUENCES)?;
            for table in registry.tables() {
                let _t = write_txn.open_table(tables::rows(table))?;
                let _t = write_txn.open_multimap_table(tables::entity_index(table))?;
            }
        }
        write_txn.commit()?;

        info!(
            "Opened metadata database at {:?} ({} tables)",
            path,
            registry.len()
        );
        Ok(Self {
            shared: Arc::new(Shared {
                db,
                registry: registry.clone(),
                observers: RwLock::new(Vec::new()),
            }),
        })
    }

    /// Attach a per-row change observer to every table
    pub fn add_observer(&self, observer: Arc<dyn MetaObserver>) {
        self.shared.observers.write().push(observer);
    }

    /// Registry this database was opened with
    #[must_use]
    pub fn registry(&self) -> &TableRegistry {
        &self.shared.registry
    }

    /// Store for one registered meta type
    pub fn store(&self, meta_type: &str) -> Result<MetaStore> {
        let table = self
            .shared
            .registry
            .resolve(meta_type)
            .cloned()
            .ok_or_else(|| Error::UnregisteredMetaType(meta_type.to_string()))?;
        Ok(MetaStore {
            shared: Arc::clone(&self.shared),
            table,
        })
    }
}

/// Metadata store for one meta table
#[derive(Clone)]
pub struct MetaStore {
    shared: Arc<Shared>,
    table: MetaTable,
}

enum Change {
    Inserted(MetaRow),
    Updated(Vec<MetaRow>),
    Unchanged,
}

impl MetaStore {
    /// Table backing this store
    #[must_use]
    pub const fn table(&self) -> &MetaTable {
        &self.table
    }

    /// Number of rows in the table
    pub fn len(&self) -> Result<usize> {
        Ok(self.len_inner()?)
    }

    /// Check if the table has no rows
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn observers(&self) -> Vec<Arc<dyn MetaObserver>> {
        self.shared.observers.read().clone()
    }

    fn len_inner(&self) -> StoreResult<usize> {
        let read_txn = self.shared.db.begin_read()?;
        let rows = read_txn.open_table(tables::rows(&self.table))?;
        let mut count = 0;
        for entry in rows.iter()? {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    fn add_inner(
        &self,
        entity_id: EntityId,
        key: &str,
        value: &MetaValue,
        unique: bool,
    ) -> StoreResult<Option<MetaRow>> {
        let write_txn = self.shared.db.begin_write()?;
        let added = {
            let mut seq = write_txn.open_table(tables::SEQUENCES)?;
            let mut rows = write_txn.open_table(tables::rows(&self.table))?;
            let mut index = write_txn.open_multimap_table(tables::entity_index(&self.table))?;
            let exists = unique
                && load_entity_rows(&rows, &index, entity_id.get())?
                    .iter()
                    .any(|(_, row)| row.key() == key);
            if exists {
                None
            } else {
                Some(self.insert_row(&mut seq, &mut rows, &mut index, entity_id, key, value)?)
            }
        };
        if added.is_some() {
            write_txn.commit()?;
        }
        Ok(added)
    }

    fn update_inner(
        &self,
        entity_id: EntityId,
        key: &str,
        value: &MetaValue,
        prev_value: Option<&MetaValue>,
    ) -> StoreResult<Change> {
        let write_txn = self.shared.db.begin_write()?;
        let change = {
            let mut seq = write_txn.open_table(tables::SEQUENCES)?;
            let mut rows = write_txn.open_table(tables::rows(&self.table))?;
            let mut index = write_txn.open_multimap_table(tables::entity_index(&self.table))?;
            let existing: Vec<(u64, StoredMetaRow)> =
                load_entity_rows(&rows, &index, entity_id.get())?
                    .into_iter()
                    .filter(|(_, row)| row.key() == key)
                    .collect();

            if existing.is_empty() {
                Change::Inserted(
                    self.insert_row(&mut seq, &mut rows, &mut index, entity_id, key, value)?,
                )
            } else if prev_value.is_none()
                && existing.len() == 1
                && existing[0].1.value()? == *value
            {
                Change::Unchanged
            } else {
                let mut updated = Vec::new();
                for (meta_id, mut stored) in existing {
                    if let Some(prev) = prev_value
                        && stored.value()? != *prev
                    {
                        continue;
                    }
                    stored.set_value(value)?;
                    rows.insert(meta_id, stored.encode()?.as_slice())?;
                    updated.push(stored.into_row(meta_id)?);
                }
                if updated.is_empty() {
                    Change::Unchanged
                } else {
                    Change::Updated(updated)
                }
            }
        };
        if !matches!(change, Change::Unchanged) {
            write_txn.commit()?;
        }
        Ok(change)
    }

    fn delete_inner(
        &self,
        entity_id: EntityId,
        key: &str,
        value: Option<&MetaValue>,
        delete_all: bool,
    ) -> StoreResult<Vec<MetaRow>> {
        let write_txn = self.shared.db.begin_write()?;
        let removed = {
            let mut rows = write_txn.open_table(tables::rows(&self.table))?;
            let mut index = write_txn.open_multimap_table(tables::entity_index(&self.table))?;
            let candidates = if delete_all {
                load_all_rows(&rows)?
            } else {
                load_entity_rows(&rows, &index, entity_id.get())?
            };

            let mut removed = Vec::new();
            for (meta_id, stored) in candidates {
                if stored.key() != key {
                    continue;
                }
                if let Some(value) = value
                    && stored.value()? != *value
                {
                    continue;
                }
                rows.remove(meta_id)?;
                index.remove(stored.entity_id, meta_id)?;
                removed.push(stored.into_row(meta_id)?);
            }
            removed
        };
        if !removed.is_empty() {
            write_txn.commit()?;
        }
        Ok(removed)
    }

    fn get_inner(&self, entity_id: EntityId, key: &str, single: bool) -> StoreResult<MetaLookup> {
        let read_txn = self.shared.db.begin_read()?;
        let rows = read_txn.open_table(tables::rows(&self.table))?;
        let index = read_txn.open_multimap_table(tables::entity_index(&self.table))?;
        let entries = load_entity_rows(&rows, &index, entity_id.get())?;

        if key.is_empty() {
            let mut all: BTreeMap<String, Vec<MetaValue>> = BTreeMap::new();
            for (_, stored) in entries {
                let value = stored.value()?;
                all.entry(stored.key().to_string())
                    .or_default()
                    .push(value);
            }
            return Ok(MetaLookup::All(all));
        }

        let mut values = Vec::new();
        for (_, stored) in entries.iter().filter(|(_, row)| row.key() == key) {
            values.push(stored.value()?);
            if single {
                break;
            }
        }
        if single {
            Ok(MetaLookup::Single(values.into_iter().next()))
        } else {
            Ok(MetaLookup::Values(values))
        }
    }

    fn get_by_meta_id_inner(&self, meta_id: MetaId) -> StoreResult<Option<MetaRow>> {
        let read_txn = self.shared.db.begin_read()?;
        let rows = read_txn.open_table(tables::rows(&self.table))?;
        load_row(&rows, meta_id.get())?
            .map(|stored| stored.into_row(meta_id.get()))
            .transpose()
    }

    fn delete_by_meta_id_inner(&self, meta_id: MetaId) -> StoreResult<Option<MetaRow>> {
        let write_txn = self.shared.db.begin_write()?;
        let removed = {
            let mut rows = write_txn.open_table(tables::rows(&self.table))?;
            let mut index = write_txn.open_multimap_table(tables::entity_index(&self.table))?;
            let stored = match rows.remove(meta_id.get())? {
                Some(guard) => StoredMetaRow::decode(guard.value())?,
                None => return Ok(None),
            };
            index.remove(stored.entity_id, meta_id.get())?;
            stored.into_row(meta_id.get())?
        };
        write_txn.commit()?;
        Ok(Some(removed))
    }

    fn meta_ids_inner(&self, entity_id: EntityId) -> StoreResult<Vec<MetaId>> {
        let read_txn = self.shared.db.begin_read()?;
        let index = read_txn.open_multimap_table(tables::entity_index(&self.table))?;
        Ok(load_meta_ids(&index, entity_id.get())?
            .into_iter()
            .map(MetaId::new)
            .collect())
    }

    fn insert_row(
        &self,
        seq: &mut Table<'_, &'static str, u64>,
        rows: &mut RowsTable<'_>,
        index: &mut IndexTable<'_>,
        entity_id: EntityId,
        key: &str,
        value: &MetaValue,
    ) -> StoreResult<MetaRow> {
        let name = self.table.name();
        let meta_id = seq.get(name)?.map_or(0, |last| last.value()) + 1;
        seq.insert(name, meta_id)?;

        let stored = StoredMetaRow::new(entity_id, key, value)?;
        rows.insert(meta_id, stored.encode()?.as_slice())?;
        index.insert(entity_id.get(), meta_id)?;

        Ok(MetaRow {
            meta_id: MetaId::new(meta_id),
            entity_id,
            meta_key: key.to_string(),
            meta_value: value.clone(),
        })
    }
}

impl MetadataStore for MetaStore {
    fn meta_type(&self) -> &str {
        self.table.meta_type().as_str()
    }

    fn add(
        &self,
        entity_id: EntityId,
        key: &str,
        value: &MetaValue,
        unique: bool,
    ) -> Result<Option<MetaId>> {
        if !entity_id.is_valid() {
            return Err(Error::InvalidEntityId(entity_id.get()));
        }
        if key.is_empty() {
            debug!("Refusing to add an empty key to {}", self.table.name());
            return Ok(None);
        }
        match self.add_inner(entity_id, key, value, unique)? {
            Some(row) => {
                debug!(
                    "Added {}.{} for {} {} (meta_id {})",
                    self.table.name(),
                    key,
                    self.table.id_column(),
                    entity_id,
                    row.meta_id
                );
                for observer in self.observers() {
                    observer.on_added(self.meta_type(), &row);
                }
                Ok(Some(row.meta_id))
            }
            None => {
                debug!(
                    "Unique key {} already set for {} {}",
                    key,
                    self.table.id_column(),
                    entity_id
                );
                Ok(None)
            }
        }
    }

    fn update(
        &self,
        entity_id: EntityId,
        key: &str,
        value: &MetaValue,
        prev_value: Option<&MetaValue>,
    ) -> Result<UpdateOutcome> {
        if !entity_id.is_valid() {
            return Err(Error::InvalidEntityId(entity_id.get()));
        }
        if key.is_empty() {
            return Ok(UpdateOutcome::Unchanged);
        }
        let prev_value = prev_value.filter(|prev| !prev.is_blank());
        let observers = self.observers();
        match self.update_inner(entity_id, key, value, prev_value)? {
            Change::Inserted(row) => {
                for observer in &observers {
                    observer.on_added(self.meta_type(), &row);
                }
                Ok(UpdateOutcome::Inserted(row.meta_id))
            }
            Change::Updated(rows) => {
                debug!(
                    "Updated {} rows of {}.{} for {} {}",
                    rows.len(),
                    self.table.name(),
                    key,
                    self.table.id_column(),
                    entity_id
                );
                for row in &rows {
                    for observer in &observers {
                        observer.on_updated(self.meta_type(), row);
                    }
                }
                Ok(UpdateOutcome::Updated(rows.len()))
            }
            Change::Unchanged => Ok(UpdateOutcome::Unchanged),
        }
    }

    fn delete(
        &self,
        entity_id: EntityId,
        key: &str,
        value: Option<&MetaValue>,
        delete_all: bool,
    ) -> Result<bool> {
        if key.is_empty() || (!entity_id.is_valid() && !delete_all) {
            return Ok(false);
        }
        let value = value.filter(|value| !value.is_blank());
        let removed = self.delete_inner(entity_id, key, value, delete_all)?;
        if removed.is_empty() {
            return Ok(false);
        }

        debug!(
            "Deleted {} rows of {}.{}",
            removed.len(),
            self.table.name(),
            key
        );
        let observers = self.observers();
        for row in &removed {
            for observer in &observers {
                observer.on_deleted(self.meta_type(), row);
            }
        }
        Ok(true)
    }

    fn get(&self, entity_id: EntityId, key: &str, single: bool) -> Result<MetaLookup> {
        if !entity_id.is_valid() {
            return Err(Error::InvalidEntityId(entity_id.get()));
        }
        Ok(self.get_inner(entity_id, key, single)?)
    }

    fn get_by_meta_id(&self, meta_id: MetaId) -> Result<Option<MetaRow>> {
        Ok(self.get_by_meta_id_inner(meta_id)?)
    }

    fn delete_by_meta_id(&self, meta_id: MetaId) -> Result<bool> {
        match self.delete_by_meta_id_inner(meta_id)? {
            Some(row) => {
                debug!("Deleted {} row {}", self.table.name(), meta_id);
                for observer in self.observers() {
                    observer.on_deleted(self.meta_type(), &row);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn meta_ids_for_entity(&self, entity_id: EntityId) -> Result<Vec<MetaId>> {
        Ok(self.meta_ids_inner(entity_id)?)
    }
}

// ---- Generic helpers ----

fn load_row(
    rows: &impl ReadableTable<u64, &'static [u8]>,
    meta_id: u64,
) -> StoreResult<Option<StoredMetaRow>> {
    match rows.get(meta_id)? {
        Some(bytes) => Ok(Some(StoredMetaRow::decode(bytes.value())?)),
        None => Ok(None),
    }
}

fn load_meta_ids(index: &impl ReadableMultimapTable<u64, u64>, entity_id: u64) -> StoreResult<Vec<u64>> {
    let mut ids = Vec::new();
    for meta_id in index.get(entity_id)? {
        ids.push(meta_id?.value());
    }
    Ok(ids)
}

/// Rows of one entity in meta_id order
fn load_entity_rows(
    rows: &impl ReadableTable<u64, &'static [u8]>,
    index: &impl ReadableMultimapTable<u64, u64>,
    entity_id: u64,
) -> StoreResult<Vec<(u64, StoredMetaRow)>> {
    let mut result = Vec::new();
    for meta_id in load_meta_ids(index, entity_id)? {
        match load_row(rows, meta_id) {
            Ok(Some(row)) => result.push((meta_id, row)),
            Ok(None) => error!("Index references missing meta row {}", meta_id),
            Err(StoreError::Bincode(e)) => error!("Failed to decode meta row {}: {}", meta_id, e),
            Err(e) => return Err(e),
        }
    }
    Ok(result)
}

fn load_all_rows(
    rows: &impl ReadableTable<u64, &'static [u8]>,
) -> StoreResult<Vec<(u64, StoredMetaRow)>> {
    let mut result = Vec::new();
    for entry in rows.iter()? {
        let entry = entry?;
        let meta_id = entry.0.value();
        match StoredMetaRow::decode(entry.1.value()) {
            Ok(row) => result.push((meta_id, row)),
            Err(e) => error!("Failed to decode meta row {}: {}", meta_id, e),
        }
    }
    Ok(result)
}
