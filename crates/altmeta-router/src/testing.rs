//! In-memory metadata store for unit tests. Records every call so tests can
//! assert which storage paths a component used.

use altmeta_common::{
    EntityId, Error, MetaId, MetaLookup, MetaRow, MetaValue, Result, UpdateOutcome,
};
use altmeta_store::MetadataStore;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Add {
        entity_id: EntityId,
        key: String,
        unique: bool,
    },
    Update {
        entity_id: EntityId,
        key: String,
        prev_value: Option<MetaValue>,
    },
    Delete {
        entity_id: EntityId,
        key: String,
        delete_all: bool,
    },
    Get {
        entity_id: EntityId,
        key: String,
        single: bool,
    },
    GetByMetaId(MetaId),
    DeleteByMetaId(MetaId),
    MetaIdsForEntity(EntityId),
}

#[derive(Default)]
struct State {
    rows: BTreeMap<u64, MetaRow>,
    last_id: u64,
    calls: Vec<Call>,
}

pub struct MemoryStore {
    meta_type: String,
    state: Mutex<State>,
    fail_verbs: bool,
    fail_enumeration: bool,
    fail_deletes: HashSet<u64>,
}

impl MemoryStore {
    pub fn new(meta_type: &str) -> Self {
        Self {
            meta_type: meta_type.to_string(),
            state: Mutex::new(State::default()),
            fail_verbs: false,
            fail_enumeration: false,
            fail_deletes: HashSet::new(),
        }
    }

    pub fn failing_verbs(mut self) -> Self {
        self.fail_verbs = true;
        self
    }

    pub fn failing_enumeration(mut self) -> Self {
        self.fail_enumeration = true;
        self
    }

    pub fn failing_delete(mut self, meta_id: u64) -> Self {
        self.fail_deletes.insert(meta_id);
        self
    }

    /// Insert a row without recording a call
    pub fn seed(&self, entity_id: u64, key: &str, value: &str) -> MetaId {
        let mut state = self.state.lock();
        state.last_id += 1;
        let meta_id = MetaId::new(state.last_id);
        state.rows.insert(
            meta_id.get(),
            MetaRow {
                meta_id,
                entity_id: EntityId::new(entity_id),
                meta_key: key.to_string(),
                meta_value: MetaValue::from(value),
            },
        );
        meta_id
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn row_count(&self) -> usize {
        self.state.lock().rows.len()
    }

    fn record(&self, call: Call) -> Result<()> {
        let verb = !matches!(
            call,
            Call::GetByMetaId(_) | Call::DeleteByMetaId(_) | Call::MetaIdsForEntity(_)
        );
        self.state.lock().calls.push(call);
        if verb && self.fail_verbs {
            return Err(Error::storage("injected failure"));
        }
        Ok(())
    }
}

impl MetadataStore for MemoryStore {
    fn meta_type(&self) -> &str {
        &self.meta_type
    }

    fn add(
        &self,
        entity_id: EntityId,
        key: &str,
        value: &MetaValue,
        unique: bool,
    ) -> Result<Option<MetaId>> {
        self.record(Call::Add {
            entity_id,
            key: key.to_string(),
            unique,
        })?;
        let mut state = self.state.lock();
        if key.is_empty() {
            return Ok(None);
        }
        if unique
            && state
                .rows
                .values()
                .any(|row| row.entity_id == entity_id && row.meta_key == key)
        {
            return Ok(None);
        }
        state.last_id += 1;
        let meta_id = MetaId::new(state.last_id);
        state.rows.insert(
            meta_id.get(),
            MetaRow {
                meta_id,
                entity_id,
                meta_key: key.to_string(),
                meta_value: value.clone(),
            },
        );
        Ok(Some(meta_id))
    }

    fn update(
        &self,
        entity_id: EntityId,
        key: &str,
        value: &MetaValue,
        prev_value: Option<&MetaValue>,
    ) -> Result<UpdateOutcome> {
        self.record(Call::Update {
            entity_id,
            key: key.to_string(),
            prev_value: prev_value.cloned(),
        })?;
        if key.is_empty() {
            return Ok(UpdateOutcome::Unchanged);
        }
        let mut state = self.state.lock();
        let mut updated = 0;
        for row in state.rows.values_mut() {
            if row.entity_id == entity_id
                && row.meta_key == key
                && prev_value.is_none_or(|prev| row.meta_value == *prev)
            {
                row.meta_value = value.clone();
                updated += 1;
            }
        }
        Ok(if updated > 0 {
            UpdateOutcome::Updated(updated)
        } else {
            UpdateOutcome::Unchanged
        })
    }

    fn delete(
        &self,
        entity_id: EntityId,
        key: &str,
        value: Option<&MetaValue>,
        delete_all: bool,
    ) -> Result<bool> {
        self.record(Call::Delete {
            entity_id,
            key: key.to_string(),
            delete_all,
        })?;
        let mut state = self.state.lock();
        let before = state.rows.len();
        state.rows.retain(|_, row| {
            !((delete_all || row.entity_id == entity_id)
                && row.meta_key == key
                && value.is_none_or(|value| row.meta_value == *value))
        });
        Ok(state.rows.len() < before)
    }

    fn get(&self, entity_id: EntityId, key: &str, single: bool) -> Result<MetaLookup> {
        self.record(Call::Get {
            entity_id,
            key: key.to_string(),
            single,
        })?;
        let state = self.state.lock();
        let values: Vec<MetaValue> = state
            .rows
            .values()
            .filter(|row| row.entity_id == entity_id && row.meta_key == key)
            .map(|row| row.meta_value.clone())
            .collect();
        Ok(if single {
            MetaLookup::Single(values.into_iter().next())
        } else {
            MetaLookup::Values(values)
        })
    }

    fn get_by_meta_id(&self, meta_id: MetaId) -> Result<Option<MetaRow>> {
        self.record(Call::GetByMetaId(meta_id))?;
        Ok(self.state.lock().rows.get(&meta_id.get()).cloned())
    }

    fn delete_by_meta_id(&self, meta_id: MetaId) -> Result<bool> {
        self.record(Call::DeleteByMetaId(meta_id))?;
        if self.fail_deletes.contains(&meta_id.get()) {
            return Err(Error::storage("injected delete failure"));
        }
        Ok(self.state.lock().rows.remove(&meta_id.get()).is_some())
    }

    fn meta_ids_for_entity(&self, entity_id: EntityId) -> Result<Vec<MetaId>> {
        self.record(Call::MetaIdsForEntity(entity_id))?;
        if self.fail_enumeration {
            return Err(Error::storage("injected enumeration failure"));
        }
        Ok(self
            .state
            .lock()
            .rows
            .values()
            .filter(|row| row.entity_id == entity_id)
            .map(|row| row.meta_id)
            .collect())
    }
}
