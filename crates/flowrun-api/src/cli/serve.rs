//! `flowrun serve`: the long-running engine process.
//!
//! Recovers executions interrupted by a previous crash, then owns the wait
//! tracker until Ctrl+C or SIGTERM.

use anyhow::Result;
use console::style;
use tokio::sync::broadcast::error::RecvError;

use crate::state::AppState;

pub async fn serve(state: &AppState, json: bool) -> Result<()> {
    if state.runner.resume_url().is_none() {
        tracing::warn!("runner.resume_url is not set, waiting executions will not be resumed");
    }

    // Subscribe before recovering so delayed crash notifications are seen.
    let mut notifications = state.bus.subscribe();
    let forwarder = tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(message) => {
                    tracing::info!(kind = %message.kind, execution_id = %message.target_id, "push notification");
                    if json {
                        match serde_json::to_string(&message) {
                            Ok(line) => println!("{line}"),
                            Err(e) => tracing::warn!(error = %e, "could not encode notification"),
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "notification subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let summary = state.recovery.recover_all().await?;
    tracing::info!(
        recovered = summary.recovered.len(),
        failed = summary.failed.len(),
        "startup crash recovery done"
    );

    state.wait_tracker.start();

    if !json {
        println!();
        if !summary.recovered.is_empty() {
            println!(
                "  {} Marked {} interrupted execution(s) as crashed",
                style("!").yellow().bold(),
                summary.recovered.len()
            );
        }
        println!(
            "  {} flowrun scheduler running, data in {}",
            style("⚡").bold(),
            style(state.data_dir.display()).cyan()
        );
        println!("  {}", style("Press Ctrl+C to stop").dim());
    }

    shutdown_signal().await;

    state.wait_tracker.stop();
    forwarder.abort();

    if !json {
        println!("\n  Scheduler stopped.");
    }
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
