//! Execution commands: recover, cancel, waiting.

use anyhow::Result;
use chrono::{DateTime, Utc};
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;
use flowrun_core::repository::run::RunStore;
use flowrun_types::run::{NodeExecutionStatus, RunSnapshot};
use serde_json::json;

use crate::state::AppState;

/// Ten years; keeps the cutoff inside chrono's range.
const MAX_HORIZON_SECS: u64 = 10 * 365 * 24 * 3600;

/// Recover one execution and print its rebuilt node states.
pub async fn recover(state: &AppState, execution_id: &str, json: bool) -> Result<()> {
    let recovered = state.recovery.recover(execution_id).await?;
    let run = &recovered.snapshot;

    if json {
        let out = json!({
            "executionId": run.id,
            "status": run.status,
            "stoppedAt": run.stopped_at,
            "lastNodeExecuted": run.data.last_node_executed,
            "crashedNodes": recovered.crashed_nodes,
            "error": run.data.error.as_ref().map(|e| &e.message),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Execution {} marked as {}",
        style("✓").green().bold(),
        style(&run.id).cyan(),
        style(run.status).red()
    );
    if let Some(error) = &run.data.error {
        println!("  {}", style(&error.message).dim());
    }
    println!();
    println!("{}", node_table(run));
    println!();
    Ok(())
}

/// Recover every unfinished execution.
pub async fn recover_all(state: &AppState, json: bool) -> Result<()> {
    let summary = state.recovery.recover_all().await?;

    if json {
        let failed: Vec<_> = summary
            .failed
            .iter()
            .map(|(id, error)| json!({ "executionId": id, "error": error }))
            .collect();
        let out = json!({ "recovered": summary.recovered, "failed": failed });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    if summary.recovered.is_empty() && summary.failed.is_empty() {
        println!(
            "  {} No interrupted executions found.",
            style("i").blue().bold()
        );
    }
    for id in &summary.recovered {
        println!("  {} {} marked as crashed", style("✓").green(), style(id).cyan());
    }
    for (id, error) in &summary.failed {
        println!("  {} {} {}", style("✗").red(), style(id).cyan(), style(error).dim());
    }
    println!();
    Ok(())
}

/// Cancel a waiting execution.
pub async fn cancel(state: &AppState, execution_id: &str, json: bool) -> Result<()> {
    let summary = state.wait_tracker.cancel(execution_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!();
    match summary {
        Some(summary) => println!(
            "  {} Execution {} canceled ({} mode, started {})",
            style("✓").green().bold(),
            style(execution_id).cyan(),
            summary.mode,
            format_time(&summary.started_at)
        ),
        None => println!(
            "  {} Execution {} is not waiting, nothing to cancel.",
            style("i").blue().bold(),
            style(execution_id).cyan()
        ),
    }
    println!();
    Ok(())
}

/// List executions waking within `within` seconds (default: the lookahead).
pub async fn waiting(state: &AppState, within: Option<u64>, json: bool) -> Result<()> {
    let horizon = within
        .unwrap_or(state.config.scheduler.lookahead_secs)
        .min(MAX_HORIZON_SECS);
    let now = Utc::now();
    let before = now + chrono::Duration::seconds(horizon as i64);
    let runs = state.store.find_waiting(before).await?;

    if json {
        let out: Vec<_> = runs
            .iter()
            .map(|w| json!({ "executionId": w.execution_id, "wakeAt": w.wake_at }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!();
        println!(
            "  {} No executions wake within {horizon}s.",
            style("i").blue().bold()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Execution").fg(Color::White),
        Cell::new("Wakes At").fg(Color::White),
        Cell::new("In").fg(Color::White),
    ]);

    for run in &runs {
        let secs = (run.wake_at - now).num_seconds();
        let due = if secs <= 0 {
            Cell::new("due").fg(Color::Yellow)
        } else {
            Cell::new(format!("{secs}s")).fg(Color::DarkGrey)
        };
        table.add_row(vec![
            Cell::new(&run.execution_id).fg(Color::Cyan),
            Cell::new(format_time(&run.wake_at)),
            due,
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

fn node_table(run: &RunSnapshot) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Node").fg(Color::White),
        Cell::new("Type").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Started").fg(Color::White),
        Cell::new("Duration").fg(Color::White),
    ]);

    for node in &run.workflow.nodes {
        let (status, started, duration) = match run.data.tasks(&node.name).last() {
            Some(task) => {
                let status = match task.execution_status {
                    NodeExecutionStatus::Success => Cell::new("● success").fg(Color::Green),
                    NodeExecutionStatus::Crashed => Cell::new("✗ crashed").fg(Color::Red),
                    NodeExecutionStatus::Error => Cell::new("✗ error").fg(Color::Red),
                    NodeExecutionStatus::Unresolved => Cell::new("? unresolved").fg(Color::Yellow),
                };
                (
                    status,
                    format_time(&task.start_time),
                    format!("{}ms", task.execution_time),
                )
            }
            None => (
                Cell::new("○ not run").fg(Color::DarkGrey),
                String::new(),
                String::new(),
            ),
        };
        table.add_row(vec![
            Cell::new(&node.name).fg(Color::Cyan),
            Cell::new(&node.node_type),
            status,
            Cell::new(started).fg(Color::DarkGrey),
            Cell::new(duration).fg(Color::DarkGrey),
        ]);
    }
    table
}

pub(crate) fn format_time(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}
