//! Shared domain types for flowrun.
//!
//! The run data model used across the engine: workflow graphs, items and
//! their lineage, per-node task records, persisted run snapshots, lifecycle
//! events, credentials and configuration.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod credential;
pub mod error;
pub mod event;
pub mod graph;
pub mod run;
