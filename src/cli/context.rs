//! Shared setup for commands that talk to the queue.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::adapters::sqlite::{initialize_database, PoolConfig, SqliteQueueStore};
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;
use crate::services::Orchestrator;

/// Load configuration from `path` when given, otherwise from the project hierarchy.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Open the configured database and recover an orchestrator from it.
pub async fn open_orchestrator(config: &Config) -> Result<Orchestrator> {
    let pool = initialize_database(
        &config.database.url(),
        Some(PoolConfig::from(&config.database)),
    )
    .await
    .with_context(|| format!("Failed to open database at {}", config.database.path))?;

    let store = Arc::new(SqliteQueueStore::new(pool));
    Orchestrator::open(store, config)
        .await
        .context("Failed to recover the task bus")
}
