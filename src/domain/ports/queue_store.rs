use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Task, TaskResult};

/// A pending task as recorded in the durable store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTask {
    pub task: Task,
    pub topic: String,
    /// Publish order across the whole bus; recovery replays in this order.
    pub sequence: u64,
    pub enqueued_at: DateTime<Utc>,
    /// Set once a consumer has extracted the task.
    pub consumed_at: Option<DateTime<Utc>>,
    /// After this instant an extracted task may be handed out again.
    pub lease_expires_at: Option<DateTime<Utc>>,
}

impl StoredTask {
    /// A freshly published, not yet extracted record.
    pub fn queued(task: Task, topic: impl Into<String>, sequence: u64, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            task,
            topic: topic.into(),
            sequence,
            enqueued_at,
            consumed_at: None,
            lease_expires_at: None,
        }
    }
}

/// A completed result as recorded in the durable store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResult {
    pub agent_type: String,
    pub result: TaskResult,
}

/// Durable persistence used by the message bus for crash recovery.
///
/// Every write must be durable when the returned future resolves.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Record a newly published task.
    async fn save_pending(&self, record: &StoredTask) -> DomainResult<()>;

    /// Record that a consumer extracted the task.
    ///
    /// Returns false when the task is not pending or was already extracted,
    /// possibly by another process sharing the store.
    async fn mark_consumed(
        &self,
        task_id: Uuid,
        consumed_at: DateTime<Utc>,
        lease_expires_at: Option<DateTime<Utc>>,
    ) -> DomainResult<bool>;

    /// Return an extracted task to the queued state.
    async fn release(&self, task_id: Uuid) -> DomainResult<()>;

    /// Atomically drop the pending record and store the result.
    async fn record_completion(&self, agent_type: &str, result: &TaskResult) -> DomainResult<()>;

    /// All pending tasks, ordered by sequence.
    async fn load_pending(&self) -> DomainResult<Vec<StoredTask>>;

    /// All completed results, oldest first.
    async fn load_results(&self) -> DomainResult<Vec<StoredResult>>;

    /// Look up one completed result.
    async fn get_result(&self, task_id: Uuid) -> DomainResult<Option<TaskResult>>;
}
