//! Port trait definitions (Hexagonal Architecture)
//!
//! - QueueStore: durable persistence of pending tasks and completed results
//! - TaskObserver: lifecycle hooks fired by the message bus
//! - AgentWorker: per-agent-type execution capability

pub mod agent_worker;
pub mod queue_store;
pub mod task_observer;

pub use agent_worker::AgentWorker;
pub use queue_store::{QueueStore, StoredResult, StoredTask};
pub use task_observer::TaskObserver;
