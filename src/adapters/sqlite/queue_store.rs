//! SQLite implementation of the QueueStore.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ResultStatus, Task, TaskPriority, TaskResult};
use crate::domain::ports::{QueueStore, StoredResult, StoredTask};

#[derive(Clone)]
pub struct SqliteQueueStore {
    pool: SqlitePool,
}

impl SqliteQueueStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn save_pending(&self, record: &StoredTask) -> DomainResult<()> {
        let task = &record.task;
        let payload_json = serde_json::to_string(&task.payload)?;
        let dependencies_json = serde_json::to_string(&task.dependencies)?;
        let sequence = i64::try_from(record.sequence).map_err(|_| {
            DomainError::ValidationFailed(format!("Sequence {} out of range", record.sequence))
        })?;
        let timeout_secs = i64::try_from(task.timeout_secs).map_err(|_| {
            DomainError::ValidationFailed(format!("Timeout {} out of range", task.timeout_secs))
        })?;

        sqlx::query(
            r#"INSERT INTO pending_tasks (id, topic, agent_type, payload, priority, dependencies,
               created_at, enqueued_at, timeout_secs, sequence, consumed_at, lease_expires_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(task.id.to_string())
        .bind(&record.topic)
        .bind(&task.agent_type)
        .bind(&payload_json)
        .bind(task.priority.rank())
        .bind(&dependencies_json)
        .bind(task.created_at.to_rfc3339())
        .bind(record.enqueued_at.to_rfc3339())
        .bind(timeout_secs)
        .bind(sequence)
        .bind(record.consumed_at.map(|t| t.to_rfc3339()))
        .bind(record.lease_expires_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_consumed(
        &self,
        task_id: Uuid,
        consumed_at: DateTime<Utc>,
        lease_expires_at: Option<DateTime<Utc>>,
    ) -> DomainResult<bool> {
        let updated = sqlx::query(
            r#"UPDATE pending_tasks SET consumed_at = ?, lease_expires_at = ?
               WHERE id = ? AND consumed_at IS NULL"#,
        )
        .bind(consumed_at.to_rfc3339())
        .bind(lease_expires_at.map(|t| t.to_rfc3339()))
        .bind(task_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(updated.rows_affected() == 1)
    }

    async fn release(&self, task_id: Uuid) -> DomainResult<()> {
        sqlx::query(
            "UPDATE pending_tasks SET consumed_at = NULL, lease_expires_at = NULL WHERE id = ?",
        )
        .bind(task_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_completion(&self, agent_type: &str, result: &TaskResult) -> DomainResult<()> {
        let payload_json = serde_json::to_string(&result.payload)?;
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM pending_tasks WHERE id = ?")
            .bind(result.task_id.to_string())
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(DomainError::TaskNotFound(result.task_id));
        }

        sqlx::query(
            r#"INSERT INTO task_results (task_id, agent_type, status, payload, duration_secs, error, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(result.task_id.to_string())
        .bind(agent_type)
        .bind(result.status.as_str())
        .bind(&payload_json)
        .bind(result.duration_secs)
        .bind(&result.error)
        .bind(result.completed_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn load_pending(&self) -> DomainResult<Vec<StoredTask>> {
        let rows: Vec<PendingTaskRow> =
            sqlx::query_as("SELECT * FROM pending_tasks ORDER BY sequence")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(StoredTask::try_from).collect()
    }

    async fn load_results(&self) -> DomainResult<Vec<StoredResult>> {
        let rows: Vec<TaskResultRow> =
            sqlx::query_as("SELECT * FROM task_results ORDER BY completed_at, task_id")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(StoredResult::try_from).collect()
    }

    async fn get_result(&self, task_id: Uuid) -> DomainResult<Option<TaskResult>> {
        let row: Option<TaskResultRow> =
            sqlx::query_as("SELECT * FROM task_results WHERE task_id = ?")
                .bind(task_id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(|r| StoredResult::try_from(r).map(|stored| stored.result))
            .transpose()
    }
}

#[derive(sqlx::FromRow)]
struct PendingTaskRow {
    id: String,
    topic: String,
    agent_type: String,
    payload: String,
    priority: i64,
    dependencies: String,
    created_at: String,
    enqueued_at: String,
    timeout_secs: i64,
    sequence: i64,
    consumed_at: Option<String>,
    lease_expires_at: Option<String>,
}

impl TryFrom<PendingTaskRow> for StoredTask {
    type Error = DomainError;

    fn try_from(row: PendingTaskRow) -> Result<Self, Self::Error> {
        let id = parse_uuid(&row.id)?;

        let priority = TaskPriority::from_rank(row.priority).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid priority: {}", row.priority))
        })?;

        let dependencies: Vec<Uuid> = serde_json::from_str(&row.dependencies)?;
        let payload: serde_json::Value = serde_json::from_str(&row.payload)?;

        let timeout_secs = u64::try_from(row.timeout_secs).map_err(|_| {
            DomainError::SerializationError(format!("Invalid timeout: {}", row.timeout_secs))
        })?;
        let sequence = u64::try_from(row.sequence).map_err(|_| {
            DomainError::SerializationError(format!("Invalid sequence: {}", row.sequence))
        })?;

        Ok(StoredTask {
            task: Task {
                id,
                agent_type: row.agent_type,
                payload,
                priority,
                dependencies,
                created_at: parse_datetime(&row.created_at)?,
                timeout_secs,
            },
            topic: row.topic,
            sequence,
            enqueued_at: parse_datetime(&row.enqueued_at)?,
            consumed_at: row.consumed_at.as_deref().map(parse_datetime).transpose()?,
            lease_expires_at: row.lease_expires_at.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TaskResultRow {
    task_id: String,
    agent_type: String,
    status: String,
    payload: String,
    duration_secs: f64,
    error: Option<String>,
    completed_at: String,
}

impl TryFrom<TaskResultRow> for StoredResult {
    type Error = DomainError;

    fn try_from(row: TaskResultRow) -> Result<Self, Self::Error> {
        let status = ResultStatus::from_str(&row.status).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid status: {}", row.status))
        })?;

        Ok(StoredResult {
            agent_type: row.agent_type,
            result: TaskResult {
                task_id: parse_uuid(&row.task_id)?,
                status,
                payload: serde_json::from_str(&row.payload)?,
                duration_secs: row.duration_secs,
                error: row.error,
                completed_at: parse_datetime(&row.completed_at)?,
            },
        })
    }
}
