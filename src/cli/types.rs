//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::commands::init::InitArgs;
use super::commands::monitor::{BottlenecksArgs, DashboardArgs};
use super::commands::serve::ServeArgs;
use super::commands::task::{
    CompleteArgs, ConsumeArgs, PendingArgs, ResultArgs, SubmitArgs,
};
use super::commands::workflow::WorkflowArgs;

#[derive(Parser, Debug)]
#[command(name = "convoy")]
#[command(about = "convoy - task bus, performance monitor and workflow planner for agent fleets", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of .convoy/
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize convoy configuration and database
    Init(InitArgs),

    /// Publish a task to its agent topic
    Submit(SubmitArgs),

    /// Plan and publish a workflow from a YAML or JSON file
    Workflow(WorkflowArgs),

    /// List pending tasks
    Pending(PendingArgs),

    /// Take the next task for an agent type
    Consume(ConsumeArgs),

    /// Record the result of a task
    Complete(CompleteArgs),

    /// Show the result of a completed task
    Result(ResultArgs),

    /// Show per-agent metrics, queue depths and bottlenecks
    Dashboard(DashboardArgs),

    /// Classify current bottlenecks
    Bottlenecks(BottlenecksArgs),

    /// Run the background bottleneck scan until interrupted
    Serve(ServeArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_submit() {
        let cli = Cli::try_parse_from([
            "convoy",
            "--json",
            "submit",
            "--agent",
            "coder",
            "--priority",
            "high",
            "--payload",
            r#"{"file":"main.rs"}"#,
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Commands::Submit(args) => {
                assert_eq!(args.agent, "coder");
                assert_eq!(args.priority, "high");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_workflow_dry_run() {
        let cli = Cli::try_parse_from(["convoy", "workflow", "flow.yaml", "--dry-run"]).unwrap();
        match cli.command {
            Commands::Workflow(args) => {
                assert!(args.dry_run);
                assert_eq!(args.file, PathBuf::from("flow.yaml"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_consume_requires_agent() {
        assert!(Cli::try_parse_from(["convoy", "consume"]).is_err());
    }
}
