//! `flowrun events <id>`: print an execution's lifecycle event log.

use anyhow::Result;
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;
use flowrun_core::repository::event_log::EventLogReader;
use flowrun_types::event::LifecycleEventName;

use super::execution::format_time;
use crate::state::AppState;

pub async fn show_events(state: &AppState, execution_id: &str, json: bool) -> Result<()> {
    let events = state.events.read(execution_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&events)?);
        return Ok(());
    }

    if events.is_empty() {
        println!();
        println!(
            "  {} No events recorded for {} in {}",
            style("i").blue().bold(),
            style(execution_id).cyan(),
            style(state.events.path().display()).dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Time").fg(Color::White),
        Cell::new("Event").fg(Color::White),
        Cell::new("Node").fg(Color::White),
    ]);

    for event in &events {
        let name = serde_json::to_value(event.event_name)?
            .as_str()
            .unwrap_or("other")
            .to_string();
        let color = match event.event_name {
            LifecycleEventName::WorkflowSuccess => Color::Green,
            LifecycleEventName::WorkflowFailed | LifecycleEventName::WorkflowCrashed => Color::Red,
            LifecycleEventName::Other => Color::DarkGrey,
            _ => Color::White,
        };
        table.add_row(vec![
            Cell::new(format_time(&event.timestamp)).fg(Color::DarkGrey),
            Cell::new(name).fg(color),
            Cell::new(event.node_name.as_deref().unwrap_or("")).fg(Color::Cyan),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}
