//! Service layer: the message bus, performance monitor, workflow optimizer,
//! orchestrator façade and worker pool.

pub mod dependency_resolver;
pub mod message_bus;
pub mod orchestrator;
pub mod performance_monitor;
pub mod worker_pool;
pub mod workflow_optimizer;

pub use dependency_resolver::DependencyResolver;
pub use message_bus::{MessageBus, PendingTask, SubscriptionId, TaskCallback};
pub use orchestrator::Orchestrator;
pub use performance_monitor::{AgentSummary, DashboardSnapshot, PerformanceMonitor};
pub use worker_pool::{execute_task, WorkerPool, WorkerPoolConfig, WorkerRegistry};
pub use workflow_optimizer::WorkflowOptimizer;
