//! Data directory status dashboard.

use anyhow::Result;
use console::style;
use courier_core::queue::QueueStore;
use courier_core::runtime::QueueKind;
use courier_core::seal::SealRepository;
use courier_core::storage::SharedStore;
use courier_types::seal::SealStatus;

use crate::cli::queue::summarize;
use crate::state::AppState;

/// Display users, seals by status, and pending work per queue.
pub async fn status(state: &AppState, json: bool) -> Result<()> {
    let users = state.users.list().await?;
    let seals = state.seals.list().await?;
    let shared_keys = state.shared.keys().await?.len();

    let seal_count = |status: SealStatus| seals.iter().filter(|s| s.status == status).count();

    let mut queues = Vec::new();
    for kind in QueueKind::ALL {
        let items = state.queue(kind).load_all().await?;
        let lanes = summarize(&items);
        let retrying = lanes.iter().filter(|l| l.head_attempts > 0).count();
        queues.push((kind, items.len(), lanes.len(), retrying));
    }

    if json {
        let queues: serde_json::Map<String, serde_json::Value> = queues
            .iter()
            .map(|(kind, pending, lanes, retrying)| {
                (
                    kind.name().to_string(),
                    serde_json::json!({
                        "pending": pending,
                        "lanes": lanes,
                        "retrying": retrying,
                    }),
                )
            })
            .collect();
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "users": users.len(),
            "seals": {
                "total": seals.len(),
                "requested": seal_count(SealStatus::Requested),
                "pushed": seal_count(SealStatus::Pushed),
                "written": seal_count(SealStatus::Written),
                "confirmed": seal_count(SealStatus::Confirmed),
            },
            "queues": queues,
            "shared_keys": shared_keys,
            "config": state.config,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Courier v{}",
        style("✉").bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!();

    println!("  {}", style("── Queues ──").dim());
    for (kind, pending, lanes, retrying) in &queues {
        let line = format!("  {:<8} {} pending in {} lane(s)", kind.name(), style(pending).bold(), lanes);
        if *retrying > 0 {
            println!("{line}, {}", style(format!("{retrying} retrying or stalled")).red());
        } else {
            println!("{line}");
        }
    }
    println!();

    println!("  {}", style("── Users ──").dim());
    println!("  Total:  {}", style(users.len()).bold());
    println!();

    println!("  {}", style("── Seals ──").dim());
    println!("  Total:     {}", style(seals.len()).bold());
    let in_flight = seals.len() - seal_count(SealStatus::Confirmed);
    if in_flight > 0 {
        println!("  In flight: {}", style(in_flight).yellow());
    }
    println!("  Confirmed: {}", style(seal_count(SealStatus::Confirmed)).green());
    println!();

    println!("  {}", style("── System ──").dim());
    println!("  Data dir:    {}", style(state.data_dir.display()).dim());
    println!("  Database:    {}", style("SQLite (WAL mode)").dim());
    println!("  Shared keys: {}", shared_keys);
    println!(
        "  Reseal:      {}",
        style(format!("{:?}", state.config.reseal).to_lowercase()).dim()
    );
    println!();

    Ok(())
}
