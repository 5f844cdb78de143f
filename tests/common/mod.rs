//! Common test utilities for integration tests
//!
//! Shared fixtures for building stores, buses and orchestrators.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use convoy::adapters::sqlite::{create_migrated_test_pool, initialize_database, SqliteQueueStore};
use convoy::domain::models::Config;
use convoy::services::Orchestrator;

/// In-memory store with migrations applied.
pub async fn memory_store() -> Arc<SqliteQueueStore> {
    let pool = create_migrated_test_pool()
        .await
        .expect("Failed to create test pool");
    Arc::new(SqliteQueueStore::new(pool))
}

/// File-backed store, for tests that reopen the same database.
pub async fn file_store(path: &Path) -> Arc<SqliteQueueStore> {
    let url = format!("sqlite:{}", path.display());
    let pool = initialize_database(&url, None)
        .await
        .expect("Failed to open file database");
    Arc::new(SqliteQueueStore::new(pool))
}

/// Default config with short polling so waits resolve quickly.
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.orchestrator.wait_poll_interval_ms = 10;
    config.orchestrator.scan_interval_secs = 1;
    config
}

pub async fn memory_orchestrator(config: &Config) -> Orchestrator {
    Orchestrator::open(memory_store().await, config)
        .await
        .expect("Failed to open orchestrator")
}

/// Initializes a tracing subscriber that writes through the test harness.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
