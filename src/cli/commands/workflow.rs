//! Implementation of the `convoy workflow` command.

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::Cell;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::cli::output::{new_table, output, CommandOutput};
use crate::domain::models::{WorkflowReceipt, WorkflowTaskDef};
use crate::services::Orchestrator;

#[derive(Args, Debug)]
pub struct WorkflowArgs {
    /// YAML or JSON file holding the task definitions
    pub file: PathBuf,

    /// Compute the plan without publishing anything
    #[arg(long)]
    pub dry_run: bool,
}

/// A workflow file is either a bare list of definitions or `{ tasks: [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WorkflowFile {
    List(Vec<WorkflowTaskDef>),
    Wrapped { tasks: Vec<WorkflowTaskDef> },
}

impl WorkflowFile {
    fn into_defs(self) -> Vec<WorkflowTaskDef> {
        match self {
            Self::List(defs) | Self::Wrapped { tasks: defs } => defs,
        }
    }
}

/// Parse workflow definitions. YAML is a superset of JSON, so one parser covers both.
pub fn parse_workflow(source: &str) -> Result<Vec<WorkflowTaskDef>> {
    let file: WorkflowFile =
        serde_yaml::from_str(source).context("Workflow file is not a list of task definitions")?;
    Ok(file.into_defs())
}

async fn read_workflow(path: &Path) -> Result<Vec<WorkflowTaskDef>> {
    let source = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_workflow(&source).with_context(|| format!("Failed to parse {}", path.display()))
}

#[derive(Debug, serde::Serialize)]
pub struct WorkflowOutput {
    #[serde(flatten)]
    pub receipt: WorkflowReceipt,
}

impl CommandOutput for WorkflowOutput {
    fn to_human(&self) -> String {
        let receipt = &self.receipt;
        let plan = &receipt.plan;
        let keys_by_id: BTreeMap<Uuid, &str> = receipt
            .task_ids
            .iter()
            .map(|(key, id)| (*id, key.as_str()))
            .collect();

        let mut table = new_table(&["Batch", "Key", "Agent", "Estimate"]);
        for batch in &plan.batches {
            for planned in &batch.tasks {
                table.add_row(vec![
                    Cell::new(batch.index),
                    Cell::new(keys_by_id.get(&planned.task_id).copied().unwrap_or("-")),
                    Cell::new(&planned.agent_type),
                    Cell::new(format!("{:.1}s", planned.estimated_secs)),
                ]);
            }
        }

        let heading = if receipt.published {
            format!("Workflow published: {} task(s)", plan.total_tasks())
        } else {
            format!("Dry run: {} task(s), nothing published", plan.total_tasks())
        };

        format!(
            "{heading}\n{table}\n\nBatches: {}\nEstimated time: {:.1}s (sequential {:.1}s)\nParallelism factor: {:.2}",
            plan.total_batches(),
            plan.total_estimated_secs,
            plan.sequential_estimated_secs,
            plan.parallelism_factor
        )
    }
}

pub async fn execute(orchestrator: &Orchestrator, args: WorkflowArgs, json_mode: bool) -> Result<()> {
    let defs = read_workflow(&args.file).await?;

    let receipt = if args.dry_run {
        orchestrator.plan_workflow(defs).await
    } else {
        orchestrator.submit_workflow(defs).await
    }
    .context("Workflow rejected")?;

    output(&WorkflowOutput { receipt }, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TaskPriority;

    #[test]
    fn test_parse_yaml_list() {
        let yaml = r"
- key: fetch
  agent_type: scraper
  payload: { url: 'https://example.com' }
- key: summarize
  agent_type: writer
  priority: high
  depends_on: [fetch]
";
        let defs = parse_workflow(yaml).unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[1].depends_on, vec!["fetch".to_string()]);
        assert_eq!(defs[1].priority, TaskPriority::High);
        assert_eq!(defs[0].priority, TaskPriority::Medium);
    }

    #[test]
    fn test_parse_wrapped_json() {
        let json = r#"{"tasks": [{"key": "a", "agent_type": "coder", "timeout_secs": 30}]}"#;
        let defs = parse_workflow(json).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].timeout_secs, Some(30));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_workflow("just a string").is_err());
    }
}
