//! Metadata hooks and the host-side hook chain
//!
//! A hook subscribes to the metadata verbs of one host type. For each verb
//! it either leaves the decision open (`None`) or short-circuits normal
//! processing with a result (`Some`). `HookChain` is the host's metadata
//! API: it asks its hooks in priority order and falls back to the host's
//! default store when none of them handles the call.

use altmeta_common::{EntityId, MetaId, MetaLookup, MetaRow, MetaValue, Result, UpdateOutcome};
use altmeta_store::MetadataStore;
use std::sync::Arc;
use tracing::{debug, info};

/// Priority for verb interception
pub const DEFAULT_PRIORITY: i32 = 10;

/// Priority for the deletion cascade, so other hooks get to veto first
pub const LATE_PRIORITY: i32 = 99;

/// Whether a host deletion should go ahead
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookFlow {
    Continue,
    Abort,
}

/// Extension points on a host type's metadata verbs
pub trait MetadataHook: Send + Sync {
    /// Host type this hook subscribes to. `None` subscribes to nothing.
    fn host_type(&self) -> Option<&str>;

    fn before_add_metadata(
        &self,
        _entity_id: EntityId,
        _key: &str,
        _value: &MetaValue,
        _unique: bool,
    ) -> Option<Result<Option<MetaId>>> {
        None
    }

    fn before_update_metadata(
        &self,
        _entity_id: EntityId,
        _key: &str,
        _value: &MetaValue,
        _prev_value: Option<&MetaValue>,
    ) -> Option<Result<UpdateOutcome>> {
        None
    }

    fn before_delete_metadata(
        &self,
        _entity_id: EntityId,
        _key: &str,
        _value: Option<&MetaValue>,
        _delete_all: bool,
    ) -> Option<Result<bool>> {
        None
    }

    fn before_get_metadata(
        &self,
        _entity_id: EntityId,
        _key: &str,
        _single: bool,
    ) -> Option<Result<MetaLookup>> {
        None
    }

    fn before_permanent_delete(&self, _entity_type: &str, _entity_id: EntityId) -> HookFlow {
        HookFlow::Continue
    }
}

struct Registered {
    priority: i32,
    hook: Arc<dyn MetadataHook>,
}

/// Metadata API of one host type with hooks in front of its default store
pub struct HookChain {
    default: Arc<dyn MetadataStore>,
    metadata_hooks: Vec<Registered>,
    delete_hooks: Vec<Registered>,
}

impl HookChain {
    /// Create a chain over the host's default store
    pub fn new(default: Arc<dyn MetadataStore>) -> Self {
        Self {
            default,
            metadata_hooks: Vec::new(),
            delete_hooks: Vec::new(),
        }
    }

    /// Host type served by this chain
    #[must_use]
    pub fn host_type(&self) -> &str {
        self.default.meta_type()
    }

    /// Subscribe a hook to the four metadata verbs. Lower priorities run
    /// first; equal priorities run in registration order.
    pub fn add_metadata_hook(&mut self, priority: i32, hook: Arc<dyn MetadataHook>) -> &mut Self {
        insert_sorted(&mut self.metadata_hooks, priority, hook);
        self
    }

    /// Subscribe a hook to permanent deletions
    pub fn add_delete_hook(&mut self, priority: i32, hook: Arc<dyn MetadataHook>) -> &mut Self {
        insert_sorted(&mut self.delete_hooks, priority, hook);
        self
    }

    /// Subscribe a hook to everything at the conventional priorities:
    /// verbs at [`DEFAULT_PRIORITY`], deletion at [`LATE_PRIORITY`]
    pub fn add_hook(&mut self, hook: Arc<dyn MetadataHook>) -> &mut Self {
        self.add_metadata_hook(DEFAULT_PRIORITY, Arc::clone(&hook));
        self.add_delete_hook(LATE_PRIORITY, hook)
    }

    /// Number of hooks subscribed to the metadata verbs
    #[must_use]
    pub fn len(&self) -> usize {
        self.metadata_hooks.len()
    }

    /// Check if no verb hooks are subscribed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metadata_hooks.is_empty()
    }

    fn hooks(&self) -> impl Iterator<Item = &Arc<dyn MetadataHook>> {
        let host = self.host_type();
        self.metadata_hooks
            .iter()
            .filter(move |r| r.hook.host_type() == Some(host))
            .map(|r| &r.hook)
    }

    /// Permanently delete a host entity: run the deletion hooks, then drop
    /// the entity's own metadata row by row. Returns `false` when a hook
    /// aborted the deletion.
    pub fn permanently_delete(&self, entity_id: EntityId) -> Result<bool> {
        let host = self.host_type();
        for registered in &self.delete_hooks {
            if registered.hook.before_permanent_delete(host, entity_id) == HookFlow::Abort {
                info!("Deletion of {} {} aborted by hook", host, entity_id);
                return Ok(false);
            }
        }

        let meta_ids = self.default.meta_ids_for_entity(entity_id)?;
        debug!(
            "Removing {} {} metadata rows of {} {}",
            meta_ids.len(),
            host,
            host,
            entity_id
        );
        for meta_id in meta_ids {
            self.default.delete_by_meta_id(meta_id)?;
        }
        Ok(true)
    }
}

fn insert_sorted(hooks: &mut Vec<Registered>, priority: i32, hook: Arc<dyn MetadataHook>) {
    let at = hooks.partition_point(|r| r.priority <= priority);
    hooks.insert(at, Registered { priority, hook });
}

impl MetadataStore for HookChain {
    fn meta_type(&self) -> &str {
        self.default.meta_type()
    }

    fn add(
        &self,
        entity_id: EntityId,
        key: &str,
        value: &MetaValue,
        unique: bool,
    ) -> Result<Option<MetaId>> {
        for hook in self.hooks() {
            if let Some(result) = hook.before_add_metadata(entity_id, key, value, unique) {
                return result;
            }
        }
        self.default.add(entity_id, key, value, unique)
    }

    fn update(
        &self,
        entity_id: EntityId,
        key: &str,
        value: &MetaValue,
        prev_value: Option<&MetaValue>,
    ) -> Result<UpdateOutcome> {
        for hook in self.hooks() {
            if let Some(result) = hook.before_update_metadata(entity_id, key, value, prev_value) {
                return result;
            }
        }
        self.default.update(entity_id, key, value, prev_value)
    }

    fn delete(
        &self,
        entity_id: EntityId,
        key: &str,
        value: Option<&MetaValue>,
        delete_all: bool,
    ) -> Result<bool> {
        for hook in self.hooks() {
            if let Some(result) = hook.before_delete_metadata(entity_id, key, value, delete_all) {
                return result;
            }
        }
        self.default.delete(entity_id, key, value, delete_all)
    }

    fn get(&self, entity_id: EntityId, key: &str, single: bool) -> Result<MetaLookup> {
        for hook in self.hooks() {
            if let Some(result) = hook.before_get_metadata(entity_id, key, single) {
                return result;
            }
        }
        self.default.get(entity_id, key, single)
    }

    fn get_by_meta_id(&self, meta_id: MetaId) -> Result<Option<MetaRow>> {
        self.default.get_by_meta_id(meta_id)
    }

    fn delete_by_meta_id(&self, meta_id: MetaId) -> Result<bool> {
        self.default.delete_by_meta_id(meta_id)
    }

    fn meta_ids_for_entity(&self, entity_id: EntityId) -> Result<Vec<MetaId>> {
        self.default.meta_ids_for_entity(entity_id)
    }
}
