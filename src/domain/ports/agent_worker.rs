use async_trait::async_trait;

use crate::domain::models::Task;

/// Execution capability for one agent type.
///
/// The worker pool dispatches each consumed task to the worker registered for
/// its agent type. `Err` carries a failure description that is stored on the
/// task's result.
#[async_trait]
pub trait AgentWorker: Send + Sync {
    /// Agent type this worker serves; its tasks arrive on `agent.<agent_type>`.
    fn agent_type(&self) -> &str;

    async fn execute(&self, task: &Task) -> Result<serde_json::Value, String>;
}
