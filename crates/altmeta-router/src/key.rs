//! Key prefix routing
//!
//! A metadata key belongs to an alternate table when it starts with
//! `{alternate_type}_`. The comparison is positional and byte-exact.

use altmeta_common::MetaType;

/// Separator between the alternate type and the routed key
pub const SEPARATOR: char = '_';

/// Classifies metadata keys for one alternate type
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRouter {
    alternate_type: MetaType,
    prefix: String,
}

impl KeyRouter {
    /// Create a router for keys prefixed `{alternate_type}_`
    #[must_use]
    pub fn new(alternate_type: MetaType) -> Self {
        let prefix = format!("{alternate_type}{SEPARATOR}");
        Self {
            alternate_type,
            prefix,
        }
    }

    /// Alternate type this router serves
    #[must_use]
    pub const fn alternate_type(&self) -> &MetaType {
        &self.alternate_type
    }

    /// The full prefix including the separator
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Return the unprefixed key if `key` belongs to the alternate table.
    ///
    /// A key equal to the prefix yields `Some("")`.
    #[must_use]
    pub fn classify<'k>(&self, key: &'k str) -> Option<&'k str> {
        key.strip_prefix(self.prefix.as_str())
    }

    /// Build the routed form of an unprefixed key
    #[must_use]
    pub fn prefixed(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}
