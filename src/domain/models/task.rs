//! Task domain model.
//!
//! Tasks are opaque units of work addressed to an agent type. They may
//! declare prerequisite tasks, which the workflow optimizer uses to order
//! publication into batches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of every agent topic: `agent.<agent_type>`.
pub const TOPIC_PREFIX: &str = "agent.";

/// Default execution timeout for a task.
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 3600;

/// Topic name for an agent type.
pub fn topic_for(agent_type: &str) -> String {
    format!("{TOPIC_PREFIX}{agent_type}")
}

/// Agent type addressed by a topic, if the topic follows the `agent.<type>` form.
pub fn agent_type_of(topic: &str) -> Option<&str> {
    topic.strip_prefix(TOPIC_PREFIX).filter(|s| !s.is_empty())
}

/// Priority level for tasks.
///
/// Lower ordinal dequeues first: `Critical < High < Medium < Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Critical = 0,
    High = 1,
    Medium = 2,
    Low = 3,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "critical" => Some(Self::Critical),
            "high" => Some(Self::High),
            "medium" | "normal" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    /// Numeric rank used for storage and ordering (0 = most urgent).
    pub const fn rank(self) -> i64 {
        self as i64
    }

    pub const fn from_rank(rank: i64) -> Option<Self> {
        match rank {
            0 => Some(Self::Critical),
            1 => Some(Self::High),
            2 => Some(Self::Medium),
            3 => Some(Self::Low),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work routed to `agent.<agent_type>`.
///
/// Once published, `id`, `agent_type` and `dependencies` are never changed
/// by the bus; consumers receive clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub agent_type: String,
    /// Caller-defined payload, opaque to the core.
    pub payload: serde_json::Value,
    pub priority: TaskPriority,
    /// Prerequisite task ids.
    #[serde(default)]
    pub dependencies: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub timeout_secs: u64,
}

impl Task {
    /// Create a task with a fresh random id.
    pub fn new(agent_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_type: agent_type.into(),
            payload,
            priority: TaskPriority::default(),
            dependencies: Vec::new(),
            created_at: Utc::now(),
            timeout_secs: DEFAULT_TASK_TIMEOUT_SECS,
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependency(mut self, dep: Uuid) -> Self {
        if !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
        self
    }

    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = Uuid>) -> Self {
        for dep in deps {
            self = self.with_dependency(dep);
        }
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Topic this task is routed to.
    pub fn topic(&self) -> String {
        topic_for(&self.agent_type)
    }

    pub fn has_dependencies(&self) -> bool {
        !self.dependencies.is_empty()
    }

    /// Validate fields the bus relies on.
    pub fn validate(&self) -> Result<(), String> {
        validate_agent_type(&self.agent_type)?;
        if self.timeout_secs == 0 {
            return Err(format!("Task {} has a zero execution timeout", self.id));
        }
        if self.dependencies.contains(&self.id) {
            return Err(format!("Task {} depends on itself", self.id));
        }
        Ok(())
    }
}

/// Agent types become topic suffixes, so they must be non-empty and free of whitespace.
pub fn validate_agent_type(agent_type: &str) -> Result<(), String> {
    if agent_type.trim().is_empty() {
        return Err("Agent type cannot be empty".to_string());
    }
    if agent_type.chars().any(char::is_whitespace) {
        return Err(format!("Agent type '{agent_type}' cannot contain whitespace"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Critical < TaskPriority::High);
        assert!(TaskPriority::High < TaskPriority::Medium);
        assert!(TaskPriority::Medium < TaskPriority::Low);
    }

    #[test]
    fn test_priority_rank_roundtrip() {
        for p in [TaskPriority::Critical, TaskPriority::High, TaskPriority::Medium, TaskPriority::Low] {
            assert_eq!(TaskPriority::from_rank(p.rank()), Some(p));
            assert_eq!(TaskPriority::from_str(p.as_str()), Some(p));
        }
        assert_eq!(TaskPriority::from_rank(7), None);
        assert_eq!(TaskPriority::from_str("NORMAL"), Some(TaskPriority::Medium));
    }

    #[test]
    fn test_topic_naming() {
        let task = Task::new("build", json!({}));
        assert_eq!(task.topic(), "agent.build");
        assert_eq!(agent_type_of("agent.build"), Some("build"));
        assert_eq!(agent_type_of("agent."), None);
        assert_eq!(agent_type_of("other.build"), None);
    }

    #[test]
    fn test_dependencies_are_deduplicated() {
        let dep = Uuid::new_v4();
        let task = Task::new("test", json!(null)).with_dependency(dep).with_dependency(dep);
        assert_eq!(task.dependencies, vec![dep]);
    }

    #[test]
    fn test_validate() {
        assert!(Task::new("lint", json!({})).validate().is_ok());
        assert!(Task::new("", json!({})).validate().is_err());
        assert!(Task::new("two words", json!({})).validate().is_err());
        assert!(Task::new("lint", json!({})).with_timeout_secs(0).validate().is_err());

        let mut task = Task::new("lint", json!({}));
        task.dependencies.push(task.id);
        assert!(task.validate().is_err());
    }
}
