//! flowrun entry point.
//!
//! Binary name: `flowrun`
//!
//! Parses CLI arguments, initializes tracing, the database and the engine
//! components, then dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;
use flowrun_observe::tracing_setup::{init_tracing, shutdown_tracing, LogOptions};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut log = LogOptions::for_verbosity(cli.verbose);
    if cli.quiet {
        log.default_filter = "error".to_string();
    }
    log.json = cli.log_json;
    log.otel = cli.otel;
    init_tracing(&log).map_err(|e| anyhow::anyhow!("initializing tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "flowrun", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init(cli.data_dir.clone()).await?;

    let result = match &cli.command {
        Commands::Serve => cli::serve::serve(&state, cli.json).await,
        Commands::Recover {
            execution_id: Some(id),
            ..
        } => cli::execution::recover(&state, id, cli.json).await,
        Commands::Recover { .. } => cli::execution::recover_all(&state, cli.json).await,
        Commands::Cancel { execution_id } => {
            cli::execution::cancel(&state, execution_id, cli.json).await
        }
        Commands::Waiting { within } => cli::execution::waiting(&state, *within, cli.json).await,
        Commands::Events { execution_id } => {
            cli::events::show_events(&state, execution_id, cli.json).await
        }
        Commands::Completions { .. } => Ok(()),
    };

    shutdown_tracing();
    result
}
