//! Property tests for workflow planning and topic queue ordering.

use std::collections::{HashMap, HashSet};

use convoy::domain::models::{DurationEstimates, QueueKey, Task, TaskPriority, TopicQueue};
use convoy::services::WorkflowOptimizer;
use convoy::DomainError;
use proptest::prelude::*;
use proptest::sample::Index;
use serde_json::json;
use uuid::Uuid;

const AGENTS: [&str; 3] = ["build", "test", "lint"];

fn priority_strategy() -> impl Strategy<Value = TaskPriority> {
    prop_oneof![
        Just(TaskPriority::Critical),
        Just(TaskPriority::High),
        Just(TaskPriority::Medium),
        Just(TaskPriority::Low),
    ]
}

/// Acyclic task sets: every task may only depend on tasks generated before it.
fn acyclic_tasks() -> impl Strategy<Value = Vec<Task>> {
    prop::collection::vec(
        (
            prop::collection::vec(any::<Index>(), 0..3),
            priority_strategy(),
            0usize..AGENTS.len(),
        ),
        1..25,
    )
    .prop_map(|specs| {
        let mut tasks: Vec<Task> = Vec::with_capacity(specs.len());
        for (i, (dep_picks, priority, agent)) in specs.into_iter().enumerate() {
            let mut task = Task::new(AGENTS[agent], json!(i)).with_priority(priority);
            if i > 0 {
                let deps: HashSet<Uuid> = dep_picks.iter().map(|pick| tasks[pick.index(i)].id).collect();
                task = task.with_dependencies(deps);
            }
            tasks.push(task);
        }
        tasks
    })
}

/// Longest prerequisite chain ending at each task, counted in tasks.
fn chain_depths(tasks: &[Task]) -> HashMap<Uuid, usize> {
    let mut depths: HashMap<Uuid, usize> = HashMap::new();
    // Generation order is already topological.
    for task in tasks {
        let depth = task
            .dependencies
            .iter()
            .filter_map(|dep| depths.get(dep))
            .max()
            .map_or(1, |d| d + 1);
        depths.insert(task.id, depth);
    }
    depths
}

fn estimates() -> DurationEstimates {
    DurationEstimates::new(60.0)
        .with_estimate("build", 30.0)
        .with_estimate("test", 90.0)
}

proptest! {
    /// Property: every input task appears in exactly one batch
    #[test]
    fn prop_batches_partition_the_input(tasks in acyclic_tasks()) {
        let plan = WorkflowOptimizer::new()
            .create_execution_plan(&tasks, &estimates())
            .unwrap();

        let planned = plan.all_task_ids();
        prop_assert_eq!(planned.len(), tasks.len());

        let planned_set: HashSet<Uuid> = planned.into_iter().collect();
        let input_set: HashSet<Uuid> = tasks.iter().map(|t| t.id).collect();
        prop_assert_eq!(planned_set, input_set);
    }

    /// Property: every prerequisite sits in a strictly earlier batch
    #[test]
    fn prop_prerequisites_in_earlier_batches(tasks in acyclic_tasks()) {
        let plan = WorkflowOptimizer::new()
            .create_execution_plan(&tasks, &estimates())
            .unwrap();
        let batch_of = plan.batch_of();

        for task in &tasks {
            let own = batch_of[&task.id];
            for dep in &task.dependencies {
                prop_assert!(batch_of[dep] < own, "dependency {} not before {}", dep, task.id);
            }
        }
    }

    /// Property: the number of batches equals the longest dependency chain
    #[test]
    fn prop_batch_count_is_minimal(tasks in acyclic_tasks()) {
        let plan = WorkflowOptimizer::new()
            .create_execution_plan(&tasks, &estimates())
            .unwrap();
        let longest = chain_depths(&tasks).values().copied().max().unwrap_or(0);
        prop_assert_eq!(plan.total_batches(), longest);
    }

    /// Property: time estimates are consistent with the batch structure
    #[test]
    fn prop_estimates_are_consistent(tasks in acyclic_tasks()) {
        let est = estimates();
        let plan = WorkflowOptimizer::new().create_execution_plan(&tasks, &est).unwrap();

        let sequential: f64 = tasks.iter().map(|t| est.estimate_secs(&t.agent_type)).sum();
        let total: f64 = plan.batches.iter().map(|b| b.estimated_secs).sum();

        prop_assert!((plan.sequential_estimated_secs - sequential).abs() < 1e-6);
        prop_assert!((plan.total_estimated_secs - total).abs() < 1e-6);
        prop_assert!(plan.parallelism_factor >= 1.0 - 1e-9);
    }

    /// Property: closing any chain into a loop makes planning fail
    #[test]
    fn prop_cycles_are_rejected(len in 1usize..10, extra in 0usize..5) {
        let mut tasks: Vec<Task> = (0..len + extra)
            .map(|i| Task::new("build", json!(i)))
            .collect();
        for i in 1..len {
            let prev = tasks[i - 1].id;
            tasks[i].dependencies.push(prev);
        }
        let last = tasks[len - 1].id;
        tasks[0].dependencies.push(last);

        let err = WorkflowOptimizer::new()
            .create_execution_plan(&tasks, &estimates())
            .unwrap_err();
        match err {
            DomainError::DependencyCycle(cycle) => prop_assert_eq!(cycle.len(), len),
            other => prop_assert!(false, "expected a cycle, got {:?}", other),
        }
    }

    /// Property: queues dequeue by priority, then FIFO
    #[test]
    fn prop_queue_orders_by_priority_then_sequence(
        priorities in prop::collection::vec(priority_strategy(), 0..60)
    ) {
        let mut queue = TopicQueue::new();
        for (sequence, priority) in priorities.iter().enumerate() {
            queue.enqueue(sequence, QueueKey::new(*priority, sequence as u64));
        }

        let mut drained = Vec::new();
        while let Some(sequence) = queue.dequeue() {
            drained.push((priorities[sequence], sequence));
        }

        let mut expected: Vec<(TaskPriority, usize)> = priorities
            .iter()
            .copied()
            .enumerate()
            .map(|(sequence, priority)| (priority, sequence))
            .collect();
        expected.sort();
        prop_assert_eq!(drained, expected);
    }
}
