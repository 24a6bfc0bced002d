//! Deferred execution: resuming runs parked until a wake time.
//!
//! [`WaitTracker`] polls the run store for runs about to wake, arms one
//! timer per run and hands each run back to the [`GraphRunner`] when its
//! timer fires. Cancellation disarms the timer and records the cancellation
//! durably; a timer that fires anyway sees the durable state and refuses.

pub mod runner;
pub mod wait_tracker;

pub use runner::{GraphRunner, ResumeRequest};
pub use wait_tracker::{ResumeOutcome, StopSummary, WaitTracker, WaitTrackerConfig};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Why a run could not be resumed or cancelled.
///
/// Resumption failures are logged and never retried.
#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("execution {0} not found")]
    RunNotFound(String),

    #[error("execution {0} has already finished")]
    AlreadyFinished(String),

    #[error("execution {0} was canceled")]
    Canceled(String),

    #[error("execution {0} is no longer waiting")]
    NotWaiting(String),

    #[error("run store error: {0}")]
    Store(String),

    #[error("credentials error: {0}")]
    Credentials(String),

    #[error("runner error: {0}")]
    Runner(String),
}
