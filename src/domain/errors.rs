//! Domain errors for the convoy orchestration core.

use thiserror::Error;
use uuid::Uuid;

/// Format a cycle path as a human-readable string: `A -> B -> C -> A`.
///
/// The path is closed by repeating the first node so the loop is visible.
fn format_cycle_path(path: &[Uuid]) -> String {
    let mut nodes: Vec<String> = path.iter().map(ToString::to_string).collect();
    if let Some(first) = path.first() {
        nodes.push(first.to_string());
    }
    nodes.join(" -> ")
}

/// Domain-level errors that can occur in the orchestration core.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Task already published: {0}")]
    DuplicateTask(Uuid),

    #[error("Task already completed: {0}")]
    AlreadyCompleted(Uuid),

    #[error("Task dependency cycle detected: {}", format_cycle_path(.0))]
    DependencyCycle(Vec<Uuid>),

    #[error("Task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: String, dependency: String },

    #[error("Timed out after {waited_secs:.1}s waiting for task {task_id}")]
    WaitTimeout { task_id: Uuid, waited_secs: f64 },

    #[error("Queue recovery failed: {0}")]
    RecoveryFailed(String),

    #[error("No worker registered for agent type: {0}")]
    NoWorker(String),

    #[error("Background loop is already running")]
    AlreadyRunning,

    #[error("Background loop is not running")]
    NotRunning,

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Whether this error is a wait timeout rather than a task or storage failure.
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::WaitTimeout { .. })
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
