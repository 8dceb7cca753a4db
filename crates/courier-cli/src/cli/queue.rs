//! Queue inspection.

use std::collections::BTreeMap;

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use courier_core::queue::QueueStore;
use courier_core::runtime::QueueKind;
use courier_types::queue::QueueItem;

use crate::state::AppState;

/// Per-key view of persisted items, in lane order.
pub struct LaneSummary {
    pub key: String,
    pub pending: usize,
    /// Failed attempts of the head item. Non-zero means the lane was
    /// retrying or stalled when the bot stopped.
    pub head_attempts: u32,
    pub head_enqueued_at: chrono::DateTime<chrono::Utc>,
}

pub fn summarize(items: &[QueueItem]) -> Vec<LaneSummary> {
    let mut lanes: BTreeMap<&str, LaneSummary> = BTreeMap::new();
    for item in items {
        lanes
            .entry(item.key.as_str())
            .and_modify(|lane| lane.pending += 1)
            .or_insert_with(|| LaneSummary {
                key: item.key.to_string(),
                pending: 1,
                head_attempts: item.attempts,
                head_enqueued_at: item.enqueued_at,
            });
    }
    lanes.into_values().collect()
}

pub async fn show_queue(
    state: &AppState,
    kind: QueueKind,
    key: Option<&str>,
    json: bool,
) -> Result<()> {
    let items: Vec<QueueItem> = state
        .queue(kind)
        .load_all()
        .await?
        .into_iter()
        .filter(|item| key.is_none_or(|k| item.key.as_str() == k))
        .collect();
    let lanes = summarize(&items);

    if json {
        let lanes: Vec<serde_json::Value> = lanes
            .iter()
            .map(|lane| {
                serde_json::json!({
                    "key": lane.key,
                    "pending": lane.pending,
                    "head_attempts": lane.head_attempts,
                    "head_enqueued_at": lane.head_enqueued_at.to_rfc3339(),
                })
            })
            .collect();
        let items: Vec<&QueueItem> = items.iter().collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "queue": kind.name(),
                "lanes": lanes,
                "items": items,
            }))?
        );
        return Ok(());
    }

    if lanes.is_empty() {
        println!();
        println!("  The {} queue is empty.", style(kind).cyan());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Key").fg(Color::White),
        Cell::new("Pending").fg(Color::White),
        Cell::new("Head attempts").fg(Color::White),
        Cell::new("Oldest").fg(Color::White),
    ]);

    for lane in &lanes {
        let attempts = if lane.head_attempts > 0 {
            Cell::new(lane.head_attempts).fg(Color::Red)
        } else {
            Cell::new(0).fg(Color::DarkGrey)
        };
        table.add_row(vec![
            Cell::new(&lane.key).fg(Color::Cyan),
            Cell::new(lane.pending),
            attempts,
            Cell::new(lane.head_enqueued_at.format("%Y-%m-%d %H:%M:%S").to_string())
                .fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!(
        "  {} item(s) across {} key(s) in the {} queue",
        items.len(),
        lanes.len(),
        style(kind).cyan()
    );
    println!();
    Ok(())
}
