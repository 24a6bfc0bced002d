//! Crash recovery: turning runs interrupted by a process crash into
//! terminal `crashed` runs.
//!
//! [`reconstruct`] rebuilds the run data from the lifecycle event log;
//! [`CrashRecovery`] loads, persists and notifies around it.

pub mod reconstruct;
pub mod service;

pub use reconstruct::{reconstruct, Reconstruction};
pub use service::{CrashRecovery, RecoveredRun, RecoverySummary};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ReconstructionError {
    #[error("execution {0} not found")]
    RunNotFound(String),

    #[error("execution {0} has already finished")]
    RunAlreadyFinished(String),

    #[error("node \"{0}\" has no node type")]
    MissingNodeType(String),

    #[error("malformed event log: {0}")]
    MalformedEventLog(String),

    #[error("event log error: {0}")]
    EventLog(String),

    #[error("run store error: {0}")]
    Store(String),
}
