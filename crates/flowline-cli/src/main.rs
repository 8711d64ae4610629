//! flowline CLI entry point.
//!
//! Binary name: `flowline`
//!
//! Parses CLI arguments, initializes tracing and application state, then
//! dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;
use flowline_observe::tracing_setup::{default_filter, init_tracing, shutdown_tracing};

use cli::workflow::RunOptions;
use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(default_filter(cli.verbose, cli.quiet), cli.otel)
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    let result = dispatch(cli).await;
    shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "flowline", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init().await?;

    match cli.command {
        Commands::Validate { file } => {
            cli::workflow::handle_validate(&file, &state, cli.json).await?;
        }

        Commands::Run {
            file,
            input,
            input_file,
            max_steps,
            ephemeral,
        } => {
            let options = RunOptions {
                input: input.as_deref(),
                input_file: input_file.as_deref(),
                max_steps,
                ephemeral,
            };
            cli::workflow::handle_run(&file, options, &state, cli.json, cli.quiet).await?;
        }

        Commands::Executions { workflow, limit } => {
            let recorder = state.execution_recorder().await?;
            cli::execution::handle_list(workflow.as_deref(), limit, &recorder, cli.json).await?;
        }

        Commands::Show { execution_id } => {
            let recorder = state.execution_recorder().await?;
            cli::execution::handle_show(&execution_id, &recorder, cli.json).await?;
        }

        Commands::Chain { action } => {
            cli::chain::handle_chain_command(action, &state, cli.json, cli.quiet).await?;
        }

        Commands::Tools => {
            cli::workflow::handle_tools(&state, cli.json)?;
        }

        Commands::Completions { .. } => {}
    }

    Ok(())
}
