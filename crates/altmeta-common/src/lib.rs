//! AltMeta Common - Shared types and utilities
//!
//! This crate provides the identifier and value types, error definitions
//! and configuration used across all AltMeta components.

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, RouterConfig};
pub use error::{Error, Result};
pub use types::*;
