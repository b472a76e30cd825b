//! Metadata router
//!
//! Sits in front of a host type's metadata verbs. Calls whose key carries
//! the alternate prefix are re-issued against the alternate store under the
//! same entity id with the prefix stripped; everything else is declined
//! (`None`) so the default store handles it unchanged. Results from the
//! alternate store are passed through as-is.

use crate::cascade::{CascadeDeleter, CascadeReport};
use crate::hooks::{HookFlow, MetadataHook};
use crate::key::KeyRouter;
use altmeta_common::{
    EntityId, Error, MetaId, MetaLookup, MetaType, MetaValue, Result, RouterConfig, UpdateOutcome,
};
use altmeta_store::{MetaDatabase, MetadataStore};
use std::sync::Arc;
use tracing::debug;

/// Routes prefixed metadata keys of one host type to an alternate store
pub struct MetaRouter {
    keys: KeyRouter,
    host_type: Option<MetaType>,
    alternate: Arc<dyn MetadataStore>,
    cascade: CascadeDeleter,
}

impl MetaRouter {
    /// Create a router over an existing alternate store.
    ///
    /// The store must serve `config.alternate_type`.
    pub fn new(config: &RouterConfig, alternate: Arc<dyn MetadataStore>) -> Result<Self> {
        let alternate_type = MetaType::new(config.alternate_type.as_str())?;
        let host_type = config
            .host_type
            .as_deref()
            .map(MetaType::new)
            .transpose()?;
        if alternate.meta_type() != alternate_type.as_str() {
            return Err(Error::configuration(format!(
                "router for '{}' given a '{}' store",
                alternate_type,
                alternate.meta_type()
            )));
        }

        Ok(Self {
            keys: KeyRouter::new(alternate_type),
            cascade: CascadeDeleter::new(host_type.clone(), Arc::clone(&alternate)),
            host_type,
            alternate,
        })
    }

    /// Create a router whose alternate store lives in `db`
    pub fn open(config: &RouterConfig, db: &MetaDatabase) -> Result<Self> {
        let alternate = db.store(&config.alternate_type)?;
        Self::new(config, Arc::new(alternate))
    }

    /// Alternate type, also the key prefix
    #[must_use]
    pub fn alternate_type(&self) -> &str {
        self.keys.alternate_type().as_str()
    }

    /// Host type whose calls are intercepted, if any
    #[must_use]
    pub fn host_type(&self) -> Option<&str> {
        self.host_type.as_ref().map(MetaType::as_str)
    }

    /// Unprefixed key if this call belongs to the alternate store
    fn route<'k>(&self, verb: &str, entity_id: EntityId, key: &'k str) -> Option<&'k str> {
        self.host_type.as_ref()?;
        let routed = self.keys.classify(key)?;
        debug!(
            "Routing {} of {:?} for entity {} to {} table",
            verb,
            routed,
            entity_id,
            self.alternate_type()
        );
        Some(routed)
    }

    /// Add through the alternate store, or decline
    pub fn add(
        &self,
        entity_id: EntityId,
        key: &str,
        value: &MetaValue,
        unique: bool,
    ) -> Option<Result<Option<MetaId>>> {
        let routed = self.route("add", entity_id, key)?;
        Some(self.alternate.add(entity_id, routed, value, unique))
    }

    /// Update-or-insert through the alternate store, or decline
    pub fn update(
        &self,
        entity_id: EntityId,
        key: &str,
        value: &MetaValue,
        prev_value: Option<&MetaValue>,
    ) -> Option<Result<UpdateOutcome>> {
        let routed = self.route("update", entity_id, key)?;
        Some(self.alternate.update(entity_id, routed, value, prev_value))
    }

    /// Delete through the alternate store, or decline
    pub fn delete(
        &self,
        entity_id: EntityId,
        key: &str,
        value: Option<&MetaValue>,
        delete_all: bool,
    ) -> Option<Result<bool>> {
        let routed = self.route("delete", entity_id, key)?;
        Some(self.alternate.delete(entity_id, routed, value, delete_all))
    }

    /// Read through the alternate store, or decline.
    ///
    /// An empty key asks for all of an entity's metadata; that cannot be
    /// attributed to one table and is always declined. A prefix-only key
    /// routes to the empty key, which never holds a value.
    pub fn get(&self, entity_id: EntityId, key: &str, single: bool) -> Option<Result<MetaLookup>> {
        if key.is_empty() {
            return None;
        }
        let routed = self.route("get", entity_id, key)?;
        if routed.is_empty() {
            return Some(Ok(if single {
                MetaLookup::Single(None)
            } else {
                MetaLookup::Values(Vec::new())
            }));
        }
        Some(self.alternate.get(entity_id, routed, single))
    }

    /// Cascade a permanent host deletion into the alternate table
    pub fn on_host_permanently_deleted(&self, entity_type: &str, entity_id: EntityId) -> HookFlow {
        self.cascade.on_host_permanently_deleted(entity_type, entity_id)
    }

    /// Remove every alternate row of `entity_id` and report what happened
    pub fn cleanup(&self, entity_id: EntityId) -> CascadeReport {
        self.cascade.cleanup(entity_id)
    }
}

impl MetadataHook for MetaRouter {
    fn host_type(&self) -> Option<&str> {
        Self::host_type(self)
    }

    fn before_add_metadata(
        &self,
        entity_id: EntityId,
        key: &str,
        value: &MetaValue,
        unique: bool,
    ) -> Option<Result<Option<MetaId>>> {
        self.add(entity_id, key, value, unique)
    }

    fn before_update_metadata(
        &self,
        entity_id: EntityId,
        key: &str,
        value: &MetaValue,
        prev_value: Option<&MetaValue>,
    ) -> Option<Result<UpdateOutcome>> {
        self.update(entity_id, key, value, prev_value)
    }

    fn before_delete_metadata(
        &self,
        entity_id: EntityId,
        key: &str,
        value: Option<&MetaValue>,
        delete_all: bool,
    ) -> Option<Result<bool>> {
        self.delete(entity_id, key, value, delete_all)
    }

    fn before_get_metadata(
        &self,
        entity_id: EntityId,
        key: &str,
        single: bool,
    ) -> Option<Result<MetaLookup>> {
        self.get(entity_id, key, single)
    }

    fn before_permanent_delete(&self, entity_type: &str, entity_id: EntityId) -> HookFlow {
        self.on_host_permanently_deleted(entity_type, entity_id)
    }
}
