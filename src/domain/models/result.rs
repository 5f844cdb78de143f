//! Task result model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Outcome reported by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Failure,
    Timeout,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "success" | "succeeded" => Some(Self::Success),
            "failure" | "failed" => Some(Self::Failure),
            "timeout" => Some(Self::Timeout),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of executing a task. At most one exists per task id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: Uuid,
    pub status: ResultStatus,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Measured execution time in seconds.
    pub duration_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn success(task_id: Uuid, payload: serde_json::Value, duration: Duration) -> Self {
        Self {
            task_id,
            status: ResultStatus::Success,
            payload,
            duration_secs: duration.as_secs_f64(),
            error: None,
            completed_at: Utc::now(),
        }
    }

    pub fn failure(task_id: Uuid, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            task_id,
            status: ResultStatus::Failure,
            payload: serde_json::Value::Null,
            duration_secs: duration.as_secs_f64(),
            error: Some(error.into()),
            completed_at: Utc::now(),
        }
    }

    pub fn timeout(task_id: Uuid, duration: Duration) -> Self {
        Self {
            task_id,
            status: ResultStatus::Timeout,
            payload: serde_json::Value::Null,
            duration_secs: duration.as_secs_f64(),
            error: Some(format!("execution exceeded {:.1}s", duration.as_secs_f64())),
            completed_at: Utc::now(),
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs.max(0.0))
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.duration_secs.is_finite() || self.duration_secs < 0.0 {
            return Err(format!(
                "Result for task {} has invalid duration {}",
                self.task_id, self.duration_secs
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_constructors() {
        let id = Uuid::new_v4();
        let ok = TaskResult::success(id, json!({"ok": true}), Duration::from_millis(1500));
        assert_eq!(ok.status, ResultStatus::Success);
        assert!((ok.duration_secs - 1.5).abs() < f64::EPSILON);
        assert!(ok.error.is_none());

        let failed = TaskResult::failure(id, "boom", Duration::from_secs(2));
        assert_eq!(failed.status, ResultStatus::Failure);
        assert_eq!(failed.error.as_deref(), Some("boom"));

        let timed_out = TaskResult::timeout(id, Duration::from_secs(3));
        assert_eq!(timed_out.status, ResultStatus::Timeout);
    }

    #[test]
    fn test_validate_rejects_negative_duration() {
        let mut result = TaskResult::success(Uuid::new_v4(), json!(null), Duration::ZERO);
        result.duration_secs = -1.0;
        assert!(result.validate().is_err());
        result.duration_secs = f64::NAN;
        assert!(result.validate().is_err());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(ResultStatus::from_str("FAILED"), Some(ResultStatus::Failure));
        assert_eq!(ResultStatus::from_str("timeout"), Some(ResultStatus::Timeout));
        assert_eq!(ResultStatus::from_str("maybe"), None);
    }
}
