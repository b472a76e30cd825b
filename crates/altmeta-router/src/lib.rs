//! AltMeta Router - alternate metadata tables behind a host type's API
//!
//! A [`MetaRouter`] watches one host type's metadata verbs and sends calls
//! whose key starts with `{alternate_type}_` to the alternate table, with
//! the prefix stripped. When a host entity is permanently deleted its
//! alternate rows are removed row by row. [`HookChain`] plays the host:
//! it runs the registered hooks in priority order before the default store.

pub mod cascade;
pub mod hooks;
pub mod key;
pub mod router;

#[cfg(test)]
mod testing;

pub use cascade::{CascadeDeleter, CascadeReport};
pub use hooks::{DEFAULT_PRIORITY, HookChain, HookFlow, LATE_PRIORITY, MetadataHook};
pub use key::KeyRouter;
pub use router::MetaRouter;
