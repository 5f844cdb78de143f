//! convoy - task bus, performance monitor and workflow planner for agent fleets
//!
//! convoy routes tasks to agent types over priority topic queues backed by
//! `SQLite`, tracks per-agent performance, flags bottlenecks and plans
//! dependency-ordered workflows into parallel batches.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, errors and the port traits
//! - **Adapters** (`adapters`): `SQLite` implementation of the queue store
//! - **Service Layer** (`services`): Message bus, monitor, optimizer, orchestrator, workers
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use convoy::adapters::sqlite::{create_migrated_test_pool, SqliteQueueStore};
//! use convoy::{Config, Orchestrator, TaskPriority};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(SqliteQueueStore::new(create_migrated_test_pool().await?));
//!     let orchestrator = Orchestrator::open(store, &Config::default()).await?;
//!     let id = orchestrator
//!         .submit_task("coder", serde_json::json!({"file": "main.rs"}), TaskPriority::High, vec![])
//!         .await?;
//!     println!("submitted {id}");
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    AgentMetrics, BottleneckReport, BottleneckSeverity, Config, ExecutionBatch, ResultStatus,
    Task, TaskPriority, TaskResult, WorkflowPlan, WorkflowReceipt, WorkflowTaskDef,
};
pub use domain::ports::{AgentWorker, QueueStore, TaskObserver};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    MessageBus, Orchestrator, PerformanceMonitor, WorkerPool, WorkerRegistry, WorkflowOptimizer,
};
