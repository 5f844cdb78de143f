//! convoy CLI entry point.

use anyhow::Result;
use clap::Parser;

use convoy::cli::commands::{init, monitor, serve, task, workflow};
use convoy::cli::context::{load_config, open_orchestrator};
use convoy::cli::{handle_error, Cli, Commands};
use convoy::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = run(cli).await {
        handle_error(err, json);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging))?;
    let json = cli.json;

    if let Commands::Init(args) = cli.command {
        return init::execute(args, &config, json).await;
    }

    let orchestrator = open_orchestrator(&config).await?;
    match cli.command {
        Commands::Init(_) => Ok(()),
        Commands::Submit(args) => task::submit(&orchestrator, args, json).await,
        Commands::Workflow(args) => workflow::execute(&orchestrator, args, json).await,
        Commands::Pending(args) => task::pending(&orchestrator, args, json).await,
        Commands::Consume(args) => task::consume(&orchestrator, args, json).await,
        Commands::Complete(args) => task::complete(&orchestrator, args, json).await,
        Commands::Result(args) => task::result(&orchestrator, args, json).await,
        Commands::Dashboard(args) => monitor::dashboard(&orchestrator, args, json).await,
        Commands::Bottlenecks(args) => monitor::bottlenecks(&orchestrator, args, json).await,
        Commands::Serve(args) => serve::execute(&orchestrator, args, json).await,
    }
}
