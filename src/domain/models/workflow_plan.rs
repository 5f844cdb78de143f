//! Workflow plan: dependency-respecting batches of tasks
//!
//! Tasks are organized into batches that can be executed in parallel within
//! each batch. Batch 0 holds tasks with no in-workflow prerequisites, batch 1
//! holds tasks that only depend on batch 0, and so on.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

use super::task::TaskPriority;

/// Estimated duration for tasks of each agent type, with a fallback for
/// agent types that have no history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationEstimates {
    pub per_agent: HashMap<String, f64>,
    pub default_secs: f64,
}

impl DurationEstimates {
    pub fn new(default_secs: f64) -> Self {
        Self {
            per_agent: HashMap::new(),
            default_secs,
        }
    }

    pub fn with_estimate(mut self, agent_type: impl Into<String>, secs: f64) -> Self {
        self.per_agent.insert(agent_type.into(), secs);
        self
    }

    pub fn estimate_secs(&self, agent_type: &str) -> f64 {
        self.per_agent
            .get(agent_type)
            .copied()
            .unwrap_or(self.default_secs)
    }
}

/// A task placed in a batch, with its estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedTask {
    pub task_id: Uuid,
    pub agent_type: String,
    pub estimated_secs: f64,
}

/// A set of mutually independent tasks eligible for concurrent execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionBatch {
    /// Batch number (0-indexed, 0 = no in-workflow prerequisites)
    pub index: usize,
    pub tasks: Vec<PlannedTask>,
    /// Longest member estimate.
    pub estimated_secs: f64,
}

impl ExecutionBatch {
    pub fn new(index: usize, tasks: Vec<PlannedTask>) -> Self {
        let estimated_secs = tasks
            .iter()
            .map(|t| t.estimated_secs)
            .fold(0.0, f64::max);
        Self {
            index,
            tasks,
            estimated_secs,
        }
    }

    pub fn task_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.tasks.iter().map(|t| t.task_id)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Parallel execution plan for one workflow submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPlan {
    pub batches: Vec<ExecutionBatch>,
    /// Sum of batch durations.
    pub total_estimated_secs: f64,
    /// Sum of every task's individual estimate.
    pub sequential_estimated_secs: f64,
    /// `sequential_estimated_secs / total_estimated_secs`; 1.0 means no gain.
    pub parallelism_factor: f64,
}

impl WorkflowPlan {
    /// Build a plan from batches, deriving the time estimates.
    pub fn from_batches(batches: Vec<ExecutionBatch>) -> Self {
        let total_estimated_secs: f64 = batches.iter().map(|b| b.estimated_secs).sum();
        let sequential_estimated_secs: f64 = batches
            .iter()
            .flat_map(|b| b.tasks.iter())
            .map(|t| t.estimated_secs)
            .sum();
        let parallelism_factor = if total_estimated_secs > 0.0 {
            sequential_estimated_secs / total_estimated_secs
        } else {
            1.0
        };

        Self {
            batches,
            total_estimated_secs,
            sequential_estimated_secs,
            parallelism_factor,
        }
    }

    pub fn empty() -> Self {
        Self::from_batches(Vec::new())
    }

    pub fn total_batches(&self) -> usize {
        self.batches.len()
    }

    pub fn total_tasks(&self) -> usize {
        self.batches.iter().map(ExecutionBatch::task_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn all_task_ids(&self) -> Vec<Uuid> {
        self.batches.iter().flat_map(ExecutionBatch::task_ids).collect()
    }

    /// Batch index of every planned task.
    pub fn batch_of(&self) -> BTreeMap<Uuid, usize> {
        self.batches
            .iter()
            .flat_map(|b| b.task_ids().map(move |id| (id, b.index)))
            .collect()
    }

    /// Validate the plan structure
    ///
    /// Checks that:
    /// - Batches are sequential starting from 0
    /// - No duplicate task IDs across batches
    /// - No empty batches
    pub fn validate(&self) -> Result<(), String> {
        for (idx, batch) in self.batches.iter().enumerate() {
            if batch.index != idx {
                return Err(format!("Batch {} has incorrect index {}", idx, batch.index));
            }
            if batch.is_empty() {
                return Err(format!("Batch {idx} is empty"));
            }
        }

        let mut seen = HashSet::new();
        for id in self.all_task_ids() {
            if !seen.insert(id) {
                return Err(format!("Duplicate task ID found: {id}"));
            }
        }

        Ok(())
    }
}

/// One task in a workflow submission, addressed by a caller-chosen key.
///
/// `depends_on` entries name other keys in the same submission or the ids of
/// tasks the bus already knows about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTaskDef {
    pub key: String,
    pub agent_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl WorkflowTaskDef {
    pub fn new(key: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            agent_type: agent_type.into(),
            payload: serde_json::Value::Null,
            priority: TaskPriority::default(),
            depends_on: Vec::new(),
            timeout_secs: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn depends_on(mut self, reference: impl Into<String>) -> Self {
        self.depends_on.push(reference.into());
        self
    }
}

/// What a workflow submission produced: the plan and the id minted for each key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowReceipt {
    pub plan: WorkflowPlan,
    pub task_ids: BTreeMap<String, Uuid>,
    /// False for a dry run.
    pub published: bool,
}

impl WorkflowReceipt {
    pub fn id_of(&self, key: &str) -> Option<Uuid> {
        self.task_ids.get(key).copied()
    }
}
