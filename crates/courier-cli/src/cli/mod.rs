//! CLI command definitions for the `courier` binary.
//!
//! Uses clap derive macros for argument parsing. Commands inspect and
//! maintain a data directory while no bot is running against it.

pub mod queue;
pub mod seal;
pub mod shared;
pub mod status;
pub mod users;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Inspect and maintain courier delivery queues, users and seals.
#[derive(Parser)]
#[command(name = "courier", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Data directory (defaults to $COURIER_DATA_DIR, then ~/.courier).
    #[arg(long, global = true, env = "COURIER_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Summary of queues, users and seals.
    Status,

    /// Show pending items of one queue.
    Queue {
        /// Which queue: send, receive or seal.
        queue: courier_core::runtime::QueueKind,

        /// Only show this key's lane.
        #[arg(long)]
        key: Option<String>,
    },

    /// Manage users and their history.
    Users {
        #[command(subcommand)]
        action: users::UsersCommand,
    },

    /// Look up seal records.
    Seal {
        #[command(subcommand)]
        action: seal::SealCommand,
    },

    /// Read bot-wide shared storage.
    Shared {
        #[command(subcommand)]
        action: shared::SharedCommand,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_queue_with_key() {
        let cli = Cli::parse_from(["courier", "queue", "send", "--key", "alice", "--json"]);
        assert!(cli.json);
        match cli.command {
            Commands::Queue { queue, key } => {
                assert_eq!(queue, courier_core::runtime::QueueKind::Send);
                assert_eq!(key.as_deref(), Some("alice"));
            }
            _ => panic!("expected queue command"),
        }
    }

    #[test]
    fn rejects_unknown_queue() {
        assert!(Cli::try_parse_from(["courier", "queue", "outbox"]).is_err());
    }
}
