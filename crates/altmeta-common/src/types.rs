//! Core type definitions for AltMeta
//!
//! Identifiers, meta type names and the value/row types shared between
//! the metadata engine and the router.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a host entity (post, user, comment, ...)
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[display("{_0}")]
pub struct EntityId(u64);

impl EntityId {
    /// Create from a raw id
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw id
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Zero is never a valid entity
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

/// Store-assigned identifier of a single metadata row
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[display("{_0}")]
pub struct MetaId(u64);

impl MetaId {
    /// Create from a raw id
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw id
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for MetaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MetaId({})", self.0)
    }
}

/// Name of a metadata namespace (`post`, `user`, `widget`, ...)
///
/// Meta types end up inside table and column names, so only lowercase
/// ASCII letters, digits and underscores are accepted.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
#[serde(try_from = "String", into = "String")]
pub struct MetaType(String);

impl MetaType {
    /// Create a new meta type (validates naming rules)
    pub fn new(name: impl Into<String>) -> Result<Self, MetaTypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Get the meta type as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(name: &str) -> Result<(), MetaTypeError> {
        if name.is_empty() {
            return Err(MetaTypeError::Empty);
        }
        if name.len() > 32 {
            return Err(MetaTypeError::TooLong);
        }
        if let Some(c) = name
            .chars()
            .find(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && *c != '_')
        {
            return Err(MetaTypeError::InvalidChar(c));
        }
        Ok(())
    }
}

impl fmt::Debug for MetaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MetaType({:?})", self.0)
    }
}

impl TryFrom<String> for MetaType {
    type Error = MetaTypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for MetaType {
    type Error = MetaTypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MetaType> for String {
    fn from(value: MetaType) -> Self {
        value.0
    }
}

impl AsRef<str> for MetaType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors that can occur when creating a meta type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetaTypeError {
    #[error("meta type must not be empty")]
    Empty,
    #[error("meta type must be at most 32 characters")]
    TooLong,
    #[error("invalid character in meta type: {0:?}")]
    InvalidChar(char),
}

/// Opaque metadata payload: a scalar or structured JSON value
#[derive(Clone, PartialEq, Serialize, Deserialize, From)]
#[serde(transparent)]
pub struct MetaValue(serde_json::Value);

impl MetaValue {
    /// Wrap an arbitrary JSON value
    #[must_use]
    pub const fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Borrow the underlying JSON value
    #[must_use]
    pub const fn as_json(&self) -> &serde_json::Value {
        &self.0
    }

    /// Unwrap into the underlying JSON value
    #[must_use]
    pub fn into_json(self) -> serde_json::Value {
        self.0
    }

    /// Null and the empty string count as "no value" when used as a
    /// filter on update and delete.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match &self.0 {
            serde_json::Value::Null => true,
            serde_json::Value::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Parse a command-line argument: JSON when it parses, otherwise a
    /// plain string.
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Self {
        serde_json::from_str(raw).map_or_else(|_| Self::from(raw), Self)
    }
}

impl fmt::Debug for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MetaValue({})", self.0)
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            serde_json::Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        Self(serde_json::Value::String(value.to_string()))
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        Self(serde_json::Value::String(value))
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        Self(value.into())
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        Self(value.into())
    }
}

/// One key/value fact about an entity
#[derive(Clone, Debug, PartialEq)]
pub struct MetaRow {
    pub meta_id: MetaId,
    pub entity_id: EntityId,
    pub meta_key: String,
    pub meta_value: MetaValue,
}

/// Result of an update-or-insert
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// No row existed for the key, so one was added
    Inserted(MetaId),
    /// This many existing rows were rewritten
    Updated(usize),
    /// Nothing matched, or the stored value was already equal
    Unchanged,
}

/// Result of a metadata read
#[derive(Clone, Debug, PartialEq)]
pub enum MetaLookup {
    /// First value for the key, when `single` was requested
    Single(Option<MetaValue>),
    /// Every value for the key in insertion order
    Values(Vec<MetaValue>),
    /// Every key of the entity (empty key requested)
    All(BTreeMap<String, Vec<MetaValue>>),
}

impl MetaLookup {
    /// Collapse to the first value regardless of shape
    #[must_use]
    pub fn first(&self) -> Option<&MetaValue> {
        match self {
            Self::Single(v) => v.as_ref(),
            Self::Values(values) => values.first(),
            Self::All(map) => map.values().find_map(|v| v.first()),
        }
    }

    /// Number of values carried
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Single(v) => usize::from(v.is_some()),
            Self::Values(values) => values.len(),
            Self::All(map) => map.values().map(Vec::len).sum(),
        }
    }

    /// Whether no value was found
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_type_validation() {
        assert!(MetaType::new("widget").is_ok());
        assert!(MetaType::new("post_type2").is_ok());
        assert_eq!(MetaType::new(""), Err(MetaTypeError::Empty));
        assert_eq!(MetaType::new("Widget"), Err(MetaTypeError::InvalidChar('W')));
        assert_eq!(
            MetaType::new("wid-get"),
            Err(MetaTypeError::InvalidChar('-'))
        );
        assert_eq!(MetaType::new("a".repeat(33)), Err(MetaTypeError::TooLong));
    }

    #[test]
    fn test_meta_type_serde() {
        let t: MetaType = serde_json::from_str("\"widget\"").unwrap();
        assert_eq!(t.as_str(), "widget");
        assert!(serde_json::from_str::<MetaType>("\"bad name\"").is_err());
    }

    #[test]
    fn test_meta_value_blank() {
        assert!(MetaValue::from("").is_blank());
        assert!(MetaValue::new(serde_json::Value::Null).is_blank());
        assert!(!MetaValue::from("x").is_blank());
        assert!(!MetaValue::from(0_i64).is_blank());
    }

    #[test]
    fn test_meta_value_parse_lenient() {
        assert_eq!(MetaValue::parse_lenient("42"), MetaValue::from(42));
        assert_eq!(MetaValue::parse_lenient("red"), MetaValue::from("red"));
        assert_eq!(
            MetaValue::parse_lenient(r#"{"a":1}"#).as_json()["a"],
            serde_json::json!(1)
        );
    }

    #[test]
    fn test_entity_id_validity() {
        assert!(!EntityId::new(0).is_valid());
        assert!(EntityId::from(7).is_valid());
        assert_eq!(EntityId::new(7).to_string(), "7");
    }

    #[test]
    fn test_lookup_first() {
        let lookup = MetaLookup::Values(vec!["a".into(), "b".into()]);
        assert_eq!(lookup.first(), Some(&MetaValue::from("a")));
        assert_eq!(lookup.len(), 2);
        assert!(MetaLookup::Single(None).is_empty());
    }
}
