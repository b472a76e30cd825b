//! Deletion cascade
//!
//! When a host entity is permanently deleted, every alternate row that
//! belongs to it is removed one row at a time through the alternate store's
//! single-row delete, so per-row side effects (observers) still run.
//! Cleanup is best effort and never blocks the host deletion.

use crate::hooks::HookFlow;
use altmeta_common::{EntityId, MetaType};
use altmeta_store::MetadataStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of one cascade run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CascadeReport {
    /// Rows found for the entity
    pub matched: usize,
    /// Rows removed
    pub deleted: usize,
    /// Per-row deletes that returned an error
    pub failed: usize,
    /// The row enumeration itself failed; nothing was attempted
    pub enumeration_failed: bool,
}

impl CascadeReport {
    /// Whether every matched row was removed
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        !self.enumeration_failed && self.failed == 0 && self.deleted == self.matched
    }
}

/// Removes alternate rows of permanently deleted host entities
#[derive(Clone)]
pub struct CascadeDeleter {
    host_type: Option<MetaType>,
    alternate: Arc<dyn MetadataStore>,
}

impl CascadeDeleter {
    /// Create a deleter for `host_type` entities. Without a host type it
    /// never cascades.
    #[must_use]
    pub fn new(host_type: Option<MetaType>, alternate: Arc<dyn MetadataStore>) -> Self {
        Self {
            host_type,
            alternate,
        }
    }

    /// Hook entry point: cascade if `entity_type` is the host type.
    /// Always lets the host deletion continue.
    pub fn on_host_permanently_deleted(&self, entity_type: &str, entity_id: EntityId) -> HookFlow {
        if self.host_type.as_ref().map(MetaType::as_str) != Some(entity_type) {
            return HookFlow::Continue;
        }

        let report = self.cleanup(entity_id);
        if report.is_complete() {
            debug!(
                "Removed {} {} rows of deleted {} {}",
                report.deleted,
                self.alternate.meta_type(),
                entity_type,
                entity_id
            );
        } else {
            warn!(
                "Partial cleanup of {} rows for deleted {} {}: {:?}",
                self.alternate.meta_type(),
                entity_type,
                entity_id,
                report
            );
        }
        HookFlow::Continue
    }

    /// Delete every alternate row of `entity_id`, one row per call
    pub fn cleanup(&self, entity_id: EntityId) -> CascadeReport {
        let meta_ids = match self.alternate.meta_ids_for_entity(entity_id) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(
                    "Failed to list {} rows of entity {}: {}",
                    self.alternate.meta_type(),
                    entity_id,
                    e
                );
                return CascadeReport {
                    enumeration_failed: true,
                    ..Default::default()
                };
            }
        };

        let mut report = CascadeReport {
            matched: meta_ids.len(),
            ..Default::default()
        };
        for meta_id in meta_ids {
            match self.alternate.delete_by_meta_id(meta_id) {
                Ok(true) => report.deleted += 1,
                Ok(false) => debug!("{} row {} already gone", self.alternate.meta_type(), meta_id),
                Err(e) => {
                    warn!(
                        "Failed to delete {} row {}: {}",
                        self.alternate.meta_type(),
                        meta_id,
                        e
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }
}
