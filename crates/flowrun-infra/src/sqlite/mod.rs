//! SQLite storage layer.
//!
//! The durable run store, backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod pool;
pub mod run;
