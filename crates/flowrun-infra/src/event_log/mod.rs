//! Lifecycle event log storage.

pub mod jsonl;

pub use jsonl::JsonlEventLog;
