//! CLI command definitions for the `flowrun` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod events;
pub mod execution;
pub mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Wait scheduling and crash recovery for workflow executions.
#[derive(Parser)]
#[command(name = "flowrun", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all log output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Data directory holding config.toml, flowrun.db and events.jsonl.
    #[arg(long, global = true, env = "FLOWRUN_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Recover crashed executions, then resume waiting ones as they wake.
    Serve,

    /// Mark interrupted executions as crashed, rebuilding their run data.
    Recover {
        /// Execution to recover.
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        execution_id: Option<String>,

        /// Recover every unfinished execution.
        #[arg(long)]
        all: bool,
    },

    /// Cancel a waiting execution.
    Cancel {
        /// Execution to cancel.
        execution_id: String,
    },

    /// List executions that wake within the scheduler's lookahead window.
    Waiting {
        /// Look this many seconds ahead instead of the configured lookahead.
        #[arg(long)]
        within: Option<u64>,
    },

    /// Print the lifecycle event log of an execution.
    Events {
        /// Execution whose events to print.
        execution_id: String,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
