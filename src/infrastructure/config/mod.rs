//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - Programmatic defaults
//! - Project YAML files under `.convoy/`
//! - `CONVOY_` environment variable overrides

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
