//! Stored types for metadata persistence.
//!
//! Rows are serialized to redb via bincode. The value column holds JSON
//! text, since bincode cannot round-trip a self-describing JSON value.

use crate::store::StoreResult;
use altmeta_common::{EntityId, MetaId, MetaRow, MetaValue};
use serde::{Deserialize, Serialize};

/// One row of a meta table as persisted
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredMetaRow {
    pub entity_id: u64,
    pub meta_key: Option<String>,
    pub meta_value: Option<String>,
}

impl StoredMetaRow {
    /// Build a row for insertion
    pub fn new(entity_id: EntityId, key: &str, value: &MetaValue) -> StoreResult<Self> {
        Ok(Self {
            entity_id: entity_id.get(),
            meta_key: Some(key.to_string()),
            meta_value: Some(serde_json::to_string(value)?),
        })
    }

    /// Key column, `""` for NULL
    #[must_use]
    pub fn key(&self) -> &str {
        self.meta_key.as_deref().unwrap_or_default()
    }

    /// Decode the value column. NULL decodes to a JSON null.
    pub fn value(&self) -> StoreResult<MetaValue> {
        match &self.meta_value {
            Some(text) => Ok(serde_json::from_str(text)?),
            None => Ok(MetaValue::new(serde_json::Value::Null)),
        }
    }

    /// Replace the value column
    pub fn set_value(&mut self, value: &MetaValue) -> StoreResult<()> {
        self.meta_value = Some(serde_json::to_string(value)?);
        Ok(())
    }

    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Convert into the public row type
    pub fn into_row(self, meta_id: u64) -> StoreResult<MetaRow> {
        let meta_value = self.value()?;
        Ok(MetaRow {
            meta_id: MetaId::new(meta_id),
            entity_id: EntityId::new(self.entity_id),
            meta_key: self.meta_key.unwrap_or_default(),
            meta_value,
        })
    }
}
