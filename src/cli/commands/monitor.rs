//! Dashboard and bottleneck commands.

use anyhow::Result;
use clap::Args;
use comfy_table::Cell;
use serde::Serialize;

use crate::cli::output::{format_bottleneck_table, format_secs, new_table, output, CommandOutput};
use crate::domain::models::BottleneckReport;
use crate::services::{DashboardSnapshot, Orchestrator};

#[derive(Args, Debug)]
pub struct DashboardArgs {}

#[derive(Args, Debug)]
pub struct BottlenecksArgs {
    /// Only show HIGH and CRITICAL findings
    #[arg(long)]
    pub alerting: bool,
}

#[derive(Debug, Serialize)]
pub struct DashboardOutput {
    #[serde(flatten)]
    pub snapshot: DashboardSnapshot,
}

impl CommandOutput for DashboardOutput {
    fn to_human(&self) -> String {
        let snapshot = &self.snapshot;
        if snapshot.agents.is_empty() {
            return "No agent activity recorded yet.".to_string();
        }

        let mut table = new_table(&[
            "Agent", "Tasks", "Succeeded", "Failed", "Success", "Avg response", "Queue", "Avg wait",
        ]);
        for agent in &snapshot.agents {
            table.add_row(vec![
                Cell::new(&agent.agent_type),
                Cell::new(agent.total_tasks),
                Cell::new(agent.succeeded),
                Cell::new(agent.failed),
                Cell::new(
                    agent
                        .success_rate
                        .map_or_else(|| "-".to_string(), |r| format!("{:.0}%", r * 100.0)),
                ),
                Cell::new(format_secs(agent.avg_response_secs)),
                Cell::new(agent.queue_depth),
                Cell::new(format_secs(agent.avg_queue_wait_secs)),
            ]);
        }

        let mut out = format!(
            "Dashboard at {}\n{table}",
            snapshot.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        if !snapshot.bottlenecks.is_empty() {
            out.push_str("\n\nBottlenecks:\n");
            out.push_str(&format_bottleneck_table(&snapshot.bottlenecks));
        }
        out
    }
}

#[derive(Debug, Serialize)]
pub struct BottlenecksOutput {
    pub bottlenecks: Vec<BottleneckReport>,
}

impl CommandOutput for BottlenecksOutput {
    fn to_human(&self) -> String {
        if self.bottlenecks.is_empty() {
            "No bottlenecks detected.".to_string()
        } else {
            format_bottleneck_table(&self.bottlenecks)
        }
    }
}

pub async fn dashboard(orchestrator: &Orchestrator, _args: DashboardArgs, json_mode: bool) -> Result<()> {
    let snapshot = orchestrator.get_dashboard().await;
    output(&DashboardOutput { snapshot }, json_mode);
    Ok(())
}

pub async fn bottlenecks(orchestrator: &Orchestrator, args: BottlenecksArgs, json_mode: bool) -> Result<()> {
    let mut bottlenecks = orchestrator.detect_bottlenecks().await;
    if args.alerting {
        bottlenecks.retain(|report| report.severity.is_alerting());
    }
    output(&BottlenecksOutput { bottlenecks }, json_mode);
    Ok(())
}
