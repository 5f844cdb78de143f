use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Task;

/// Dependency graph analysis over one submitted set of tasks.
///
/// Only edges between members of the set are considered; prerequisites that
/// point outside the set are treated as already satisfied.
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver;

// Standalone helper for cycle detection (no self needed)
fn detect_cycle_util(
    node: Uuid,
    graph: &HashMap<Uuid, Vec<Uuid>>,
    visited: &mut HashSet<Uuid>,
    rec_stack: &mut HashSet<Uuid>,
    path: &mut Vec<Uuid>,
) -> bool {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(neighbors) = graph.get(&node) {
        for &neighbor in neighbors {
            if !visited.contains(&neighbor) {
                if detect_cycle_util(neighbor, graph, visited, rec_stack, path) {
                    return true;
                }
            } else if rec_stack.contains(&neighbor) {
                if let Some(cycle_start) = path.iter().position(|&id| id == neighbor) {
                    path.drain(0..cycle_start);
                    return true;
                }
            }
        }
    }

    rec_stack.remove(&node);
    path.pop();
    false
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self
    }

    /// Reject sets that contain the same task id twice.
    pub fn validate_unique_ids(&self, tasks: &[Task]) -> DomainResult<()> {
        let mut seen = HashSet::with_capacity(tasks.len());
        for task in tasks {
            if !seen.insert(task.id) {
                return Err(DomainError::ValidationFailed(format!(
                    "Task {} appears more than once in the workflow",
                    task.id
                )));
            }
        }
        Ok(())
    }

    /// Adjacency list from each task to its in-set prerequisites, in declared order.
    fn prerequisite_graph(tasks: &[Task]) -> HashMap<Uuid, Vec<Uuid>> {
        let ids: HashSet<Uuid> = tasks.iter().map(|t| t.id).collect();
        tasks
            .iter()
            .map(|task| {
                let deps = task
                    .dependencies
                    .iter()
                    .copied()
                    .filter(|dep| ids.contains(dep))
                    .collect();
                (task.id, deps)
            })
            .collect()
    }

    /// Detect a dependency cycle, returning the ids along it.
    ///
    /// Tasks are visited in input order so the reported cycle is stable.
    pub fn detect_cycle(&self, tasks: &[Task]) -> Option<Vec<Uuid>> {
        let graph = Self::prerequisite_graph(tasks);

        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for task in tasks {
            if !visited.contains(&task.id)
                && detect_cycle_util(task.id, &graph, &mut visited, &mut rec_stack, &mut path)
            {
                return Some(path);
            }
        }

        None
    }

    /// Topological order: prerequisites before dependents, ties in input order.
    pub fn topological_sort(&self, tasks: &[Task]) -> DomainResult<Vec<Task>> {
        if let Some(cycle) = self.detect_cycle(tasks) {
            return Err(DomainError::DependencyCycle(cycle));
        }

        let graph = Self::prerequisite_graph(tasks);
        let mut in_degree: HashMap<Uuid, usize> =
            graph.iter().map(|(id, deps)| (*id, deps.len())).collect();
        let mut dependents: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for task in tasks {
            for dep in &graph[&task.id] {
                dependents.entry(*dep).or_default().push(task.id);
            }
        }

        // Kahn's algorithm
        let mut queue: VecDeque<Uuid> = tasks
            .iter()
            .filter(|t| in_degree.get(&t.id) == Some(&0))
            .map(|t| t.id)
            .collect();
        let task_map: HashMap<Uuid, &Task> = tasks.iter().map(|t| (t.id, t)).collect();
        let mut sorted = Vec::with_capacity(tasks.len());

        while let Some(node_id) = queue.pop_front() {
            if let Some(task) = task_map.get(&node_id) {
                sorted.push((*task).clone());
            }

            if let Some(children) = dependents.get(&node_id) {
                for child in children {
                    if let Some(degree) = in_degree.get_mut(child) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(*child);
                        }
                    }
                }
            }
        }

        if sorted.len() != tasks.len() {
            return Err(DomainError::ValidationFailed(
                "Topological sort did not visit every task".to_string(),
            ));
        }

        Ok(sorted)
    }

    /// Level of every task: 0 with no in-set prerequisites, otherwise one more
    /// than its deepest prerequisite.
    pub fn compute_levels(&self, tasks: &[Task]) -> DomainResult<HashMap<Uuid, usize>> {
        let order = self.topological_sort(tasks)?;
        let graph = Self::prerequisite_graph(tasks);
        let mut levels: HashMap<Uuid, usize> = HashMap::with_capacity(order.len());

        for task in &order {
            let level = graph[&task.id]
                .iter()
                .filter_map(|dep| levels.get(dep))
                .map(|l| l + 1)
                .max()
                .unwrap_or(0);
            levels.insert(task.id, level);
        }

        Ok(levels)
    }
}
