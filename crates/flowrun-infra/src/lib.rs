//! Infrastructure layer for flowrun.
//!
//! Contains implementations of the port traits defined in `flowrun-core`:
//! the SQLite run store, the reqwest HTTP transport and runner client, the
//! environment credential provider and the JSON-lines event log.

pub mod config;
pub mod credential;
pub mod event_log;
pub mod http;
pub mod sqlite;
