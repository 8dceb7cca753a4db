//! User subcommands: list, history, delete.

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use courier_core::queue::QueueStore;
use courier_core::runtime::QueueKind;
use courier_types::message::TYPE_KEY;
use courier_types::queue::QueueKey;
use courier_types::user::{Direction, HistoryEntry};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};

use crate::state::AppState;

#[derive(Subcommand)]
pub enum UsersCommand {
    /// List all users.
    #[command(alias = "ls")]
    List,

    /// Show a user's message history, oldest first.
    History {
        /// User id.
        id: String,

        /// Only show the most recent N entries.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Delete a user, its history and its pending sends and receives.
    #[command(alias = "rm")]
    Delete {
        /// User id.
        id: String,

        /// Skip confirmation prompt.
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_users_command(cmd: UsersCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        UsersCommand::List => list_users(state, json).await,
        UsersCommand::History { id, limit } => show_history(state, &id, limit, json).await,
        UsersCommand::Delete { id, force } => delete_user(state, &id, force, json).await,
    }
}

async fn list_users(state: &AppState, json: bool) -> Result<()> {
    let users = state.users.list().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&users)?);
        return Ok(());
    }

    if users.is_empty() {
        println!();
        println!("  No users yet.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Id").fg(Color::White),
        Cell::new("Messages").fg(Color::White),
        Cell::new("Created").fg(Color::White),
        Cell::new("Updated").fg(Color::White),
    ]);

    for user in &users {
        let messages = state.users.history(&user.id).await?.len();
        table.add_row(vec![
            Cell::new(&user.id).fg(Color::Cyan),
            Cell::new(messages),
            Cell::new(user.created_at.format("%Y-%m-%d %H:%M").to_string()).fg(Color::DarkGrey),
            Cell::new(user.updated_at.format("%Y-%m-%d %H:%M").to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!("  {} user(s)", users.len());
    println!();
    Ok(())
}

/// One-line description of a history wrapper for table output.
pub fn describe(entry: &HistoryEntry) -> String {
    let object = match entry.direction {
        Direction::Outbound => entry.wrapper.get("object").unwrap_or(&entry.wrapper),
        Direction::Inbound => entry
            .wrapper
            .get("object")
            .and_then(|signed| signed.get("object"))
            .unwrap_or(&entry.wrapper),
    };

    match (
        object.get(TYPE_KEY).and_then(|t| t.as_str()),
        object.get("message").and_then(|m| m.as_str()),
    ) {
        (_, Some(text)) => text.to_string(),
        (Some(kind), None) => format!("<{kind}>"),
        (None, None) => "-".to_string(),
    }
}

async fn show_history(state: &AppState, id: &str, limit: Option<usize>, json: bool) -> Result<()> {
    state
        .users
        .get(id)
        .await?
        .with_context(|| format!("User '{id}' not found"))?;

    let mut history = state.users.history(id).await?;
    if let Some(limit) = limit {
        let skip = history.len().saturating_sub(limit);
        history.drain(..skip);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    if history.is_empty() {
        println!();
        println!("  No messages for {}.", style(id).cyan());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("When").fg(Color::White),
        Cell::new("").fg(Color::White),
        Cell::new("Link").fg(Color::White),
        Cell::new("Message").fg(Color::White),
    ]);

    for entry in &history {
        let direction = match entry.direction {
            Direction::Inbound => Cell::new("← in").fg(Color::Green),
            Direction::Outbound => Cell::new("→ out").fg(Color::Blue),
        };
        table.add_row(vec![
            Cell::new(entry.recorded_at.format("%Y-%m-%d %H:%M:%S").to_string())
                .fg(Color::DarkGrey),
            direction,
            Cell::new(entry.link.as_deref().unwrap_or("-")).fg(Color::DarkGrey),
            Cell::new(describe(entry)),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

async fn delete_user(state: &AppState, id: &str, force: bool, json: bool) -> Result<()> {
    state
        .users
        .get(id)
        .await?
        .with_context(|| format!("User '{id}' not found"))?;

    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Permanently delete user '{}', its history and pending messages?",
                style(id).red().bold()
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.red} {msg}")?);
    spinner.set_message(format!("Deleting {id}..."));
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));

    let key = QueueKey::new(id);
    let sends = state.queue(QueueKind::Send).clear(&key).await?;
    let receives = state.queue(QueueKind::Receive).clear(&key).await?;
    state.users.delete(id).await?;

    spinner.finish_and_clear();

    if json {
        println!(
            "{}",
            serde_json::json!({
                "deleted": true,
                "id": id,
                "cleared": { "send": sends, "receive": receives },
            })
        );
    } else {
        println!(
            "  {} User '{}' deleted ({} pending send(s), {} pending receive(s) dropped).",
            style("✓").red().bold(),
            id,
            sends,
            receives
        );
    }
    Ok(())
}
