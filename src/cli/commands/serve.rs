//! Implementation of the `convoy serve` command.

use anyhow::{Context, Result};
use clap::Args;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::services::Orchestrator;

#[derive(Args, Debug)]
pub struct ServeArgs {}

/// Run the background scan and print alerts until Ctrl-C.
pub async fn execute(orchestrator: &Orchestrator, _args: ServeArgs, json_mode: bool) -> Result<()> {
    let mut alerts = orchestrator.alerts();
    orchestrator
        .start()
        .await
        .context("Failed to start the bottleneck scan")?;
    info!("convoy serving; press Ctrl-C to stop");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
            alert = alerts.recv() => match alert {
                Ok(report) => {
                    if json_mode {
                        println!("{}", serde_json::to_string(&report)?);
                    } else {
                        println!(
                            "[{}] {}: {}",
                            report.severity, report.agent_type, report.reason
                        );
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Alert stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    orchestrator.stop().await.context("Failed to stop the bottleneck scan")?;
    info!("convoy stopped");
    Ok(())
}
