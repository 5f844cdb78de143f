//! Worker dispatch table and the consume/execute/complete loops that drive it.

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::message_bus::MessageBus;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{topic_for, validate_agent_type, Task, TaskResult};
use crate::domain::ports::AgentWorker;

/// Agent type to worker mapping.
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, Arc<dyn AgentWorker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker under its agent type. Each agent type takes one worker.
    pub fn register(&mut self, worker: Arc<dyn AgentWorker>) -> DomainResult<()> {
        let agent_type = worker.agent_type().to_string();
        validate_agent_type(&agent_type).map_err(DomainError::ValidationFailed)?;
        if self.workers.contains_key(&agent_type) {
            return Err(DomainError::ValidationFailed(format!(
                "A worker is already registered for agent type '{agent_type}'"
            )));
        }
        self.workers.insert(agent_type, worker);
        Ok(())
    }

    pub fn get(&self, agent_type: &str) -> DomainResult<Arc<dyn AgentWorker>> {
        self.workers
            .get(agent_type)
            .cloned()
            .ok_or_else(|| DomainError::NoWorker(agent_type.to_string()))
    }

    /// Registered agent types, sorted.
    pub fn agent_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.workers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

/// Pool sizing and polling.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Concurrent loops per agent type.
    pub loops_per_agent: usize,
    /// Longest a loop blocks in `consume`; bounds shutdown latency.
    pub poll_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            loops_per_agent: 1,
            poll_timeout: Duration::from_millis(500),
        }
    }
}

/// Runs registered workers against their topics until shut down.
pub struct WorkerPool {
    bus: Arc<MessageBus>,
    registry: WorkerRegistry,
    config: WorkerPoolConfig,
    shutdown_tx: Option<broadcast::Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(bus: Arc<MessageBus>, registry: WorkerRegistry, config: WorkerPoolConfig) -> Self {
        Self {
            bus,
            registry,
            config,
            shutdown_tx: None,
            handles: Vec::new(),
        }
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    /// Spawn the consume loops for every registered agent type.
    pub fn start(&mut self) -> DomainResult<()> {
        if self.shutdown_tx.is_some() {
            return Err(DomainError::AlreadyRunning);
        }

        let (shutdown_tx, _) = broadcast::channel(1);
        for agent_type in self.registry.agent_types() {
            let worker = self.registry.get(&agent_type)?;
            for index in 0..self.config.loops_per_agent.max(1) {
                let bus = Arc::clone(&self.bus);
                let worker = Arc::clone(&worker);
                let shutdown_rx = shutdown_tx.subscribe();
                let poll_timeout = self.config.poll_timeout;
                self.handles.push(tokio::spawn(run_worker_loop(
                    bus,
                    worker,
                    shutdown_rx,
                    poll_timeout,
                    index,
                )));
            }
        }

        info!(
            agent_types = self.registry.len(),
            loops = self.handles.len(),
            "Worker pool started"
        );
        self.shutdown_tx = Some(shutdown_tx);
        Ok(())
    }

    /// Signal every loop to stop after its current task and wait for them.
    pub async fn shutdown(&mut self) -> DomainResult<()> {
        let shutdown_tx = self.shutdown_tx.take().ok_or(DomainError::NotRunning)?;
        let _ = shutdown_tx.send(());

        for outcome in join_all(self.handles.drain(..)).await {
            if let Err(e) = outcome {
                warn!(error = %e, "Worker loop ended abnormally");
            }
        }
        info!("Worker pool stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }
}

async fn run_worker_loop(
    bus: Arc<MessageBus>,
    worker: Arc<dyn AgentWorker>,
    mut shutdown_rx: broadcast::Receiver<()>,
    poll_timeout: Duration,
    index: usize,
) {
    let topic = topic_for(worker.agent_type());
    debug!(topic = %topic, index, "Worker loop started");

    loop {
        // Checked between tasks only, so a consumed task is always completed.
        match shutdown_rx.try_recv() {
            Err(TryRecvError::Empty) => {}
            _ => break,
        }

        let Some(task) = bus.consume(&topic, poll_timeout).await else {
            continue;
        };

        let result = execute_task(worker.as_ref(), &task).await;
        if let Err(e) = bus.complete_task(task.id, result).await {
            warn!(task_id = %task.id, error = %e, "Failed to record task completion");
        }
    }

    debug!(topic = %topic, index, "Worker loop stopped");
}

/// Run `worker` on `task`, enforcing the task's execution timeout.
pub async fn execute_task(worker: &dyn AgentWorker, task: &Task) -> TaskResult {
    let started = Instant::now();
    let limit = Duration::from_secs(task.timeout_secs);

    match tokio::time::timeout(limit, worker.execute(task)).await {
        Ok(Ok(payload)) => TaskResult::success(task.id, payload, started.elapsed()),
        Ok(Err(error)) => {
            warn!(task_id = %task.id, agent_type = %task.agent_type, error = %error, "Task failed");
            TaskResult::failure(task.id, error, started.elapsed())
        }
        Err(_) => {
            warn!(
                task_id = %task.id,
                agent_type = %task.agent_type,
                timeout_secs = task.timeout_secs,
                "Task exceeded its execution timeout"
            );
            TaskResult::timeout(task.id, started.elapsed())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteQueueStore};
    use crate::domain::models::{BusConfig, ResultStatus};
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoWorker;

    #[async_trait]
    impl AgentWorker for EchoWorker {
        fn agent_type(&self) -> &str {
            "echo"
        }

        async fn execute(&self, task: &Task) -> Result<serde_json::Value, String> {
            if task.payload == json!("fail") {
                return Err("asked to fail".to_string());
            }
            Ok(task.payload.clone())
        }
    }

    struct SlowWorker;

    #[async_trait]
    impl AgentWorker for SlowWorker {
        fn agent_type(&self) -> &str {
            "slow"
        }

        async fn execute(&self, _task: &Task) -> Result<serde_json::Value, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!(null))
        }
    }

    async fn setup_bus() -> Arc<MessageBus> {
        let pool = create_migrated_test_pool().await.unwrap();
        let store = Arc::new(SqliteQueueStore::new(pool));
        Arc::new(MessageBus::open(store, BusConfig::default()).await.unwrap())
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = WorkerRegistry::new();
        registry.register(Arc::new(EchoWorker)).unwrap();
        assert!(registry.register(Arc::new(EchoWorker)).is_err());
        assert_eq!(registry.agent_types(), vec!["echo".to_string()]);
        assert!(matches!(registry.get("missing"), Err(DomainError::NoWorker(_))));
    }

    #[tokio::test]
    async fn test_execute_task_outcomes() {
        let ok = Task::new("echo", json!({"v": 1}));
        let result = execute_task(&EchoWorker, &ok).await;
        assert_eq!(result.status, ResultStatus::Success);
        assert_eq!(result.payload, json!({"v": 1}));

        let failing = Task::new("echo", json!("fail"));
        let result = execute_task(&EchoWorker, &failing).await;
        assert_eq!(result.status, ResultStatus::Failure);
        assert_eq!(result.error.as_deref(), Some("asked to fail"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_task_enforces_timeout() {
        let task = Task::new("slow", json!(null)).with_timeout_secs(1);
        let result = execute_task(&SlowWorker, &task).await;
        assert_eq!(result.status, ResultStatus::Timeout);
    }

    #[tokio::test]
    async fn test_pool_processes_and_shuts_down() {
        let bus = setup_bus().await;
        let mut registry = WorkerRegistry::new();
        registry.register(Arc::new(EchoWorker)).unwrap();

        let mut pool = WorkerPool::new(
            Arc::clone(&bus),
            registry,
            WorkerPoolConfig {
                loops_per_agent: 2,
                poll_timeout: Duration::from_millis(20),
            },
        );
        pool.start().unwrap();
        assert!(matches!(pool.start(), Err(DomainError::AlreadyRunning)));

        let task = Task::new("echo", json!("hello"));
        bus.publish("agent.echo", task.clone()).await.unwrap();

        let mut result = None;
        for _ in 0..100 {
            result = bus.get_result(task.id).await.unwrap();
            if result.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(result.unwrap().payload, json!("hello"));

        pool.shutdown().await.unwrap();
        assert!(!pool.is_running());
        assert!(matches!(pool.shutdown().await, Err(DomainError::NotRunning)));
    }
}
