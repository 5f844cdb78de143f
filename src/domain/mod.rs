//! Domain layer for the convoy orchestration core
//!
//! This module contains the core models, the error type and the port traits
//! that adapters and workers implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
