//! Courier maintenance CLI entry point.
//!
//! Binary name: `courier`
//!
//! Parses CLI arguments, opens the data directory's database, then
//! dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,courier=debug",
        _ => "trace",
    };
    courier_observe::tracing_setup::init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "courier", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init(cli.data_dir).await?;

    let result = match cli.command {
        Commands::Status => cli::status::status(&state, cli.json).await,
        Commands::Queue { queue, key } => {
            cli::queue::show_queue(&state, queue, key.as_deref(), cli.json).await
        }
        Commands::Users { action } => {
            cli::users::handle_users_command(action, &state, cli.json).await
        }
        Commands::Seal { action } => cli::seal::handle_seal_command(action, &state, cli.json).await,
        Commands::Shared { action } => {
            cli::shared::handle_shared_command(action, &state, cli.json).await
        }
        Commands::Completions { .. } => Ok(()),
    };

    courier_observe::tracing_setup::shutdown_tracing();
    result
}
