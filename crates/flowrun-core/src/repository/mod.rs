//! Port traits for durable state.
//!
//! The infrastructure layer (flowrun-infra) implements these against SQLite,
//! the environment and the event log files. The core crate never depends on
//! any specific storage technology.

pub mod credential;
pub mod event_log;
pub mod run;
