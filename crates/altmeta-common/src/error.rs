//! Error types for AltMeta
//!
//! This module defines the common error types used throughout the system.

use crate::types::MetaTypeError;
use thiserror::Error;

/// Common result type for AltMeta operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for AltMeta
#[derive(Debug, Error)]
pub enum Error {
    // Storage errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    // Metadata errors
    #[error("invalid entity id: {0}")]
    InvalidEntityId(u64),

    #[error("invalid meta type: {0}")]
    InvalidMetaType(#[from] MetaTypeError),

    #[error("meta type not registered: {0}")]
    UnregisteredMetaType(String),

    #[error("table registry already installed")]
    RegistryAlreadyInstalled,

    // Internal errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if this is a storage backend failure
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Storage(_) | Self::Serialization(_) | Self::Deserialization(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            Self::Deserialization(e.to_string())
        } else {
            Self::Serialization(e.to_string())
        }
    }
}
