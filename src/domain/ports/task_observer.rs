use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::models::{Task, TaskResult};

/// Lifecycle hooks fired by the message bus after its state lock is released.
#[async_trait]
pub trait TaskObserver: Send + Sync {
    /// A consumer extracted `task`, which had been enqueued at `enqueued_at`.
    async fn task_started(&self, task: &Task, enqueued_at: DateTime<Utc>);

    /// `task` completed; `queue_depth` is its topic's depth right after completion.
    async fn task_completed(&self, task: &Task, result: &TaskResult, queue_depth: usize);
}
