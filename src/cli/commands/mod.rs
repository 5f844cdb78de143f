//! CLI command implementations.

pub mod init;
pub mod monitor;
pub mod serve;
pub mod task;
pub mod workflow;
