//! Seal subcommands: look up one record or list them.

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use courier_core::seal::SealRepository;
use courier_types::seal::{Seal, SealStatus};

use crate::state::AppState;

#[derive(Subcommand)]
pub enum SealCommand {
    /// Show one seal by link.
    Get {
        /// Content link the seal anchors.
        link: String,
    },

    /// List seals, oldest request first.
    #[command(alias = "ls")]
    List {
        /// Only show seals in this status.
        #[arg(long)]
        status: Option<SealStatus>,
    },
}

pub async fn handle_seal_command(cmd: SealCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        SealCommand::Get { link } => get_seal(state, &link, json).await,
        SealCommand::List { status } => list_seals(state, status, json).await,
    }
}

fn status_color(status: SealStatus) -> Color {
    match status {
        SealStatus::Requested => Color::Yellow,
        SealStatus::Pushed => Color::Blue,
        SealStatus::Written => Color::Cyan,
        SealStatus::Confirmed => Color::Green,
    }
}

async fn get_seal(state: &AppState, link: &str, json: bool) -> Result<()> {
    let seal = state
        .seals
        .get(link)
        .await?
        .with_context(|| format!("Seal '{link}' not found"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&seal)?);
        return Ok(());
    }

    println!();
    println!("  {}  {}", style("Link:").bold(), style(&seal.link).cyan());
    println!("  {}  {}", style("Status:").bold(), seal.status);
    println!(
        "  {}  {}",
        style("Tx:").bold(),
        seal.tx_id.as_deref().unwrap_or("-")
    );
    println!("  {}  {}", style("Confirmations:").bold(), seal.confirmations);
    println!(
        "  {}  {}",
        style("Requested:").bold(),
        seal.requested_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "  {}  {}",
        style("Updated:").bold(),
        seal.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!();
    Ok(())
}

pub fn filter_by_status(seals: Vec<Seal>, status: Option<SealStatus>) -> Vec<Seal> {
    match status {
        Some(status) => seals.into_iter().filter(|s| s.status == status).collect(),
        None => seals,
    }
}

async fn list_seals(state: &AppState, status: Option<SealStatus>, json: bool) -> Result<()> {
    let seals = filter_by_status(state.seals.list().await?, status);

    if json {
        println!("{}", serde_json::to_string_pretty(&seals)?);
        return Ok(());
    }

    if seals.is_empty() {
        println!();
        println!("  No seals.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Link").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Tx").fg(Color::White),
        Cell::new("Confirmations").fg(Color::White),
        Cell::new("Requested").fg(Color::White),
    ]);

    for seal in &seals {
        table.add_row(vec![
            Cell::new(&seal.link).fg(Color::Cyan),
            Cell::new(seal.status).fg(status_color(seal.status)),
            Cell::new(seal.tx_id.as_deref().unwrap_or("-")).fg(Color::DarkGrey),
            Cell::new(seal.confirmations),
            Cell::new(seal.requested_at.format("%Y-%m-%d %H:%M").to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!("  {} seal(s)", seals.len());
    println!();
    Ok(())
}
