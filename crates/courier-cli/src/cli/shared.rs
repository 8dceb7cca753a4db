//! Shared storage subcommands.

use anyhow::{Context, Result};
use clap::Subcommand;
use console::style;
use courier_core::storage::SharedStore;

use crate::state::AppState;

#[derive(Subcommand)]
pub enum SharedCommand {
    /// List stored keys.
    #[command(alias = "ls")]
    List,

    /// Print the value stored under a key.
    Get {
        /// Storage key.
        key: String,
    },
}

pub async fn handle_shared_command(cmd: SharedCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        SharedCommand::List => {
            let keys = state.shared.keys().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&keys)?);
            } else if keys.is_empty() {
                println!();
                println!("  Shared storage is empty.");
                println!();
            } else {
                println!();
                for key in &keys {
                    println!("  {}", style(key).cyan());
                }
                println!();
                println!("  {} key(s)", keys.len());
                println!();
            }
        }
        SharedCommand::Get { key } => {
            let value = state
                .shared
                .get(&key)
                .await?
                .with_context(|| format!("Key '{key}' not found"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!();
                println!("  {}", style(&key).cyan().bold());
                for line in serde_json::to_string_pretty(&value)?.lines() {
                    println!("  {line}");
                }
                println!();
            }
        }
    }
    Ok(())
}
