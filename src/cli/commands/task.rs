//! Single-task commands: submit, pending, consume, complete and result.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use comfy_table::Cell;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use crate::cli::output::{new_table, output, truncate, CommandOutput};
use crate::domain::models::{topic_for, ResultStatus, Task, TaskPriority, TaskResult};
use crate::services::Orchestrator;

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Agent type that should execute the task
    #[arg(short, long)]
    pub agent: String,

    /// Task payload as JSON
    #[arg(short, long, default_value = "{}")]
    pub payload: String,

    /// Priority: critical, high, medium or low
    #[arg(short = 'P', long, default_value = "medium")]
    pub priority: String,

    /// Prerequisite task ids (comma-separated)
    #[arg(short = 'D', long, value_delimiter = ',')]
    pub depends_on: Vec<Uuid>,

    /// Execution timeout in seconds
    #[arg(short, long)]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug)]
pub struct PendingArgs {
    /// Only show tasks for this agent type
    #[arg(short, long)]
    pub agent: Option<String>,
}

#[derive(Args, Debug)]
pub struct ConsumeArgs {
    /// Agent type whose topic to consume from
    #[arg(short, long)]
    pub agent: String,

    /// Seconds to wait for a task
    #[arg(short, long, default_value = "0")]
    pub timeout: u64,
}

#[derive(Args, Debug)]
pub struct CompleteArgs {
    /// Task id
    pub task_id: Uuid,

    /// Outcome: success, failure or timeout
    #[arg(short, long, default_value = "success")]
    pub status: String,

    /// Result payload as JSON
    #[arg(short, long, default_value = "null")]
    pub payload: String,

    /// Error message for a failed task
    #[arg(short, long)]
    pub error: Option<String>,

    /// Execution time in seconds
    #[arg(short, long, default_value = "0")]
    pub duration: f64,
}

#[derive(Args, Debug)]
pub struct ResultArgs {
    /// Task id
    pub task_id: Uuid,

    /// Block up to this many seconds for the result
    #[arg(short, long)]
    pub wait: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct SubmitOutput {
    pub task_id: Uuid,
    pub topic: String,
    pub priority: TaskPriority,
    pub dependencies: Vec<Uuid>,
}

impl CommandOutput for SubmitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            "Task submitted successfully!".to_string(),
            format!("  Task ID: {}", self.task_id),
            format!("  Topic: {}", self.topic),
            format!("  Priority: {}", self.priority),
        ];
        if !self.dependencies.is_empty() {
            lines.push(format!("  Dependencies: {} task(s)", self.dependencies.len()));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct PendingRow {
    pub task_id: Uuid,
    pub agent_type: String,
    pub priority: TaskPriority,
    pub enqueued_at: DateTime<Utc>,
    pub in_flight: bool,
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct PendingOutput {
    pub tasks: Vec<PendingRow>,
}

impl CommandOutput for PendingOutput {
    fn to_human(&self) -> String {
        if self.tasks.is_empty() {
            return "No pending tasks.".to_string();
        }

        let mut table = new_table(&["ID", "Agent", "Priority", "Enqueued", "State", "Payload"]);
        for row in &self.tasks {
            table.add_row(vec![
                Cell::new(&row.task_id.to_string()[..8]),
                Cell::new(&row.agent_type),
                Cell::new(row.priority),
                Cell::new(row.enqueued_at.format("%Y-%m-%d %H:%M:%S")),
                Cell::new(if row.in_flight { "in flight" } else { "queued" }),
                Cell::new(truncate(&row.payload.to_string(), 40)),
            ]);
        }
        format!("{table}\n\nShowing {} task(s)", self.tasks.len())
    }
}

#[derive(Debug, Serialize)]
pub struct ConsumeOutput {
    pub task: Option<Task>,
}

impl CommandOutput for ConsumeOutput {
    fn to_human(&self) -> String {
        match &self.task {
            None => "No task available.".to_string(),
            Some(task) => format!(
                "Task {}\n  Agent type: {}\n  Priority: {}\n  Timeout: {}s\n  Payload: {}",
                task.id, task.agent_type, task.priority, task.timeout_secs, task.payload
            ),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResultOutput {
    pub result: TaskResult,
}

impl CommandOutput for ResultOutput {
    fn to_human(&self) -> String {
        let r = &self.result;
        let mut lines = vec![
            format!("Task {}", r.task_id),
            format!("  Status: {}", r.status),
            format!("  Duration: {:.2}s", r.duration_secs),
            format!("  Completed at: {}", r.completed_at.format("%Y-%m-%d %H:%M:%S UTC")),
            format!("  Payload: {}", r.payload),
        ];
        if let Some(error) = &r.error {
            lines.push(format!("  Error: {error}"));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.result).unwrap_or_default()
    }
}

fn parse_json(raw: &str, what: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw).with_context(|| format!("{what} is not valid JSON"))
}

fn parse_priority(raw: &str) -> Result<TaskPriority> {
    TaskPriority::from_str(raw)
        .ok_or_else(|| anyhow!("Unknown priority '{raw}'. Use critical, high, medium or low"))
}

pub async fn submit(orchestrator: &Orchestrator, args: SubmitArgs, json_mode: bool) -> Result<()> {
    let payload = parse_json(&args.payload, "Payload")?;
    let priority = parse_priority(&args.priority)?;

    let timeout = args
        .timeout
        .unwrap_or(orchestrator.bus().config().default_task_timeout_secs);
    let task = Task::new(&args.agent, payload)
        .with_priority(priority)
        .with_dependencies(args.depends_on.iter().copied())
        .with_timeout_secs(timeout);

    let task_id = orchestrator
        .submit(task)
        .await
        .context("Failed to submit task")?;

    output(
        &SubmitOutput {
            task_id,
            topic: topic_for(&args.agent),
            priority,
            dependencies: args.depends_on,
        },
        json_mode,
    );
    Ok(())
}

pub async fn pending(orchestrator: &Orchestrator, args: PendingArgs, json_mode: bool) -> Result<()> {
    let tasks = orchestrator
        .bus()
        .get_pending_tasks(args.agent.as_deref())
        .await
        .into_iter()
        .map(|pending| PendingRow {
            task_id: pending.task.id,
            agent_type: pending.task.agent_type,
            priority: pending.task.priority,
            enqueued_at: pending.enqueued_at,
            in_flight: pending.in_flight,
            payload: pending.task.payload,
        })
        .collect();

    output(&PendingOutput { tasks }, json_mode);
    Ok(())
}

pub async fn consume(orchestrator: &Orchestrator, args: ConsumeArgs, json_mode: bool) -> Result<()> {
    let topic = topic_for(&args.agent);
    let task = orchestrator
        .bus()
        .consume(&topic, Duration::from_secs(args.timeout))
        .await;

    output(&ConsumeOutput { task }, json_mode);
    Ok(())
}

pub async fn complete(orchestrator: &Orchestrator, args: CompleteArgs, json_mode: bool) -> Result<()> {
    let status = ResultStatus::from_str(&args.status)
        .ok_or_else(|| anyhow!("Unknown status '{}'. Use success, failure or timeout", args.status))?;
    if !args.duration.is_finite() || args.duration < 0.0 {
        return Err(anyhow!("Duration must be a non-negative number of seconds"));
    }
    let duration = Duration::from_secs_f64(args.duration);

    let result = match status {
        ResultStatus::Success => {
            TaskResult::success(args.task_id, parse_json(&args.payload, "Payload")?, duration)
        }
        ResultStatus::Failure => TaskResult::failure(
            args.task_id,
            args.error.unwrap_or_else(|| "unspecified failure".to_string()),
            duration,
        ),
        ResultStatus::Timeout => TaskResult::timeout(args.task_id, duration),
    };

    orchestrator
        .bus()
        .complete_task(args.task_id, result.clone())
        .await
        .with_context(|| format!("Failed to complete task {}", args.task_id))?;

    output(&ResultOutput { result }, json_mode);
    Ok(())
}

pub async fn result(orchestrator: &Orchestrator, args: ResultArgs, json_mode: bool) -> Result<()> {
    let result = match args.wait {
        Some(secs) => orchestrator
            .wait_for_task(args.task_id, Duration::from_secs(secs))
            .await
            .with_context(|| format!("No result for task {}", args.task_id))?,
        None => orchestrator
            .get_result(args.task_id)
            .await?
            .ok_or_else(|| {
                anyhow!(
                    "Task {} has no result yet. Use 'convoy pending' to see queued tasks.",
                    args.task_id
                )
            })?,
    };

    output(&ResultOutput { result }, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_priority() {
        assert_eq!(parse_priority("HIGH").unwrap(), TaskPriority::High);
        assert!(parse_priority("urgent").is_err());
    }

    #[test]
    fn test_parse_json_reports_field() {
        let err = parse_json("{not json", "Payload").unwrap_err();
        assert!(err.to_string().contains("Payload"));
    }

    #[test]
    fn test_consume_output_empty() {
        assert_eq!(ConsumeOutput { task: None }.to_human(), "No task available.");
    }
}
