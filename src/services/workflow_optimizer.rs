//! Workflow optimizer: turns a dependency-annotated task set into batches.
//!
//! Planning is all-or-nothing. A cycle or a malformed set fails the whole
//! plan before anything is published.

use std::collections::HashMap;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::dependency_resolver::DependencyResolver;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{DurationEstimates, ExecutionBatch, PlannedTask, Task, WorkflowPlan};

/// Stateless planner; duration estimates are supplied per call.
#[derive(Debug, Clone, Default)]
pub struct WorkflowOptimizer {
    resolver: DependencyResolver,
}

impl WorkflowOptimizer {
    pub fn new() -> Self {
        Self {
            resolver: DependencyResolver::new(),
        }
    }

    /// Group `tasks` into the minimum number of sequential batches.
    ///
    /// Every task lands in the batch after its deepest in-set prerequisite.
    /// Within a batch, tasks are ordered by priority and then input order.
    #[instrument(skip_all, fields(task_count = tasks.len()), err)]
    pub fn create_execution_plan(
        &self,
        tasks: &[Task],
        estimates: &DurationEstimates,
    ) -> DomainResult<WorkflowPlan> {
        if tasks.is_empty() {
            return Ok(WorkflowPlan::empty());
        }

        self.resolver.validate_unique_ids(tasks)?;

        // Before per-task validation, so a self-dependency reports as a one-task cycle.
        if let Some(cycle) = self.resolver.detect_cycle(tasks) {
            return Err(DomainError::DependencyCycle(cycle));
        }

        for task in tasks {
            task.validate().map_err(DomainError::ValidationFailed)?;
        }

        let levels = self.resolver.compute_levels(tasks)?;
        let batch_count = levels.values().max().map_or(0, |max| max + 1);

        let mut grouped: Vec<Vec<(usize, &Task)>> = vec![Vec::new(); batch_count];
        for (position, task) in tasks.iter().enumerate() {
            let level = levels.get(&task.id).copied().unwrap_or(0);
            grouped[level].push((position, task));
        }

        let batches: Vec<ExecutionBatch> = grouped
            .into_iter()
            .enumerate()
            .map(|(index, mut members)| {
                members.sort_by_key(|(position, task)| (task.priority, *position));
                let planned = members
                    .into_iter()
                    .map(|(_, task)| PlannedTask {
                        task_id: task.id,
                        agent_type: task.agent_type.clone(),
                        estimated_secs: estimates.estimate_secs(&task.agent_type),
                    })
                    .collect();
                ExecutionBatch::new(index, planned)
            })
            .collect();

        let plan = WorkflowPlan::from_batches(batches);
        plan.validate().map_err(DomainError::ValidationFailed)?;

        debug!(
            batches = plan.total_batches(),
            total_estimated_secs = plan.total_estimated_secs,
            parallelism_factor = plan.parallelism_factor,
            "Execution plan created"
        );

        Ok(plan)
    }

    /// Tasks of `plan` in publication order.
    pub fn order_for_publication(&self, plan: &WorkflowPlan, tasks: Vec<Task>) -> Vec<Task> {
        let mut by_id: HashMap<Uuid, Task> = tasks.into_iter().map(|t| (t.id, t)).collect();
        plan.all_task_ids()
            .into_iter()
            .filter_map(|id| by_id.remove(&id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TaskPriority;
    use serde_json::json;

    fn estimates() -> DurationEstimates {
        DurationEstimates::new(60.0)
            .with_estimate("build", 100.0)
            .with_estimate("test", 50.0)
            .with_estimate("lint", 20.0)
    }

    #[test]
    fn test_three_task_scenario() {
        let optimizer = WorkflowOptimizer::new();
        let t1 = Task::new("build", json!({})).with_priority(TaskPriority::High);
        let t2 = Task::new("test", json!({}))
            .with_priority(TaskPriority::Medium)
            .with_dependency(t1.id);
        let t3 = Task::new("lint", json!({})).with_priority(TaskPriority::Medium);

        let plan = optimizer
            .create_execution_plan(&[t1.clone(), t2.clone(), t3.clone()], &estimates())
            .unwrap();

        assert_eq!(plan.total_batches(), 2);
        assert_eq!(plan.batches[0].task_ids().collect::<Vec<_>>(), vec![t1.id, t3.id]);
        assert_eq!(plan.batches[1].task_ids().collect::<Vec<_>>(), vec![t2.id]);

        let expected = (100.0 + 50.0 + 20.0) / (100.0_f64.max(20.0) + 50.0);
        assert!((plan.parallelism_factor - expected).abs() < 1e-9);
        assert!((plan.total_estimated_secs - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_batch_order_by_priority_then_input() {
        let optimizer = WorkflowOptimizer::new();
        let low = Task::new("lint", json!(1)).with_priority(TaskPriority::Low);
        let critical = Task::new("lint", json!(2)).with_priority(TaskPriority::Critical);
        let medium_a = Task::new("lint", json!(3));
        let medium_b = Task::new("lint", json!(4));

        let plan = optimizer
            .create_execution_plan(
                &[low.clone(), medium_a.clone(), critical.clone(), medium_b.clone()],
                &estimates(),
            )
            .unwrap();

        assert_eq!(plan.total_batches(), 1);
        assert_eq!(
            plan.batches[0].task_ids().collect::<Vec<_>>(),
            vec![critical.id, medium_a.id, medium_b.id, low.id]
        );
    }

    #[test]
    fn test_cycle_fails_plan() {
        let optimizer = WorkflowOptimizer::new();
        let mut a = Task::new("build", json!({}));
        let b = Task::new("test", json!({})).with_dependency(a.id);
        a.dependencies.push(b.id);

        let err = optimizer
            .create_execution_plan(&[a, b], &estimates())
            .unwrap_err();
        assert!(matches!(err, DomainError::DependencyCycle(ref path) if path.len() == 2));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let mut task = Task::new("build", json!({}));
        task.dependencies.push(task.id);

        let err = WorkflowOptimizer::new()
            .create_execution_plan(&[task.clone()], &estimates())
            .unwrap_err();
        match err {
            DomainError::DependencyCycle(path) => assert_eq!(path, vec![task.id]),
            other => panic!("expected a dependency cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_agent_uses_default_estimate() {
        let optimizer = WorkflowOptimizer::new();
        let task = Task::new("docs", json!({}));
        let plan = optimizer
            .create_execution_plan(&[task], &estimates())
            .unwrap();
        assert!((plan.total_estimated_secs - 60.0).abs() < f64::EPSILON);
        assert!((plan.parallelism_factor - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_input() {
        let plan = WorkflowOptimizer::new()
            .create_execution_plan(&[], &estimates())
            .unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_order_for_publication() {
        let optimizer = WorkflowOptimizer::new();
        let a = Task::new("build", json!({}));
        let b = Task::new("test", json!({})).with_dependency(a.id);
        let tasks = vec![b.clone(), a.clone()];

        let plan = optimizer.create_execution_plan(&tasks, &estimates()).unwrap();
        let ordered = optimizer.order_for_publication(&plan, tasks);
        assert_eq!(ordered.iter().map(|t| t.id).collect::<Vec<_>>(), vec![a.id, b.id]);
    }
}
