//! Session settings: schema, loading and validation.
//!
//! - Schema definitions in [`schema`]
//! - File loading in [`loader`]
//! - Validation in [`validator`]
//!
//! # Example
//!
//! ```
//! use decibel::config::{load_settings, validate_settings};
//! use tempfile::TempDir;
//! use std::fs;
//!
//! let temp = TempDir::new().unwrap();
//! let path = temp.path().join("decibel.yml");
//! fs::write(&path, "localhost_only: false").unwrap();
//!
//! let settings = load_settings(&path).unwrap();
//! validate_settings(&settings).unwrap();
//! assert!(!settings.localhost_only);
//! ```

pub mod loader;
pub mod schema;
pub mod validator;

pub use loader::{load_settings, parse_settings};
pub use schema::{settings_schema, FileDeliveryMode, OptimizerConfig, SessionSettings};
pub use validator::{check_settings, validate_settings, ValidationError};
