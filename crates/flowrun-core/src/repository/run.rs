//! Durable run store trait definition.

use chrono::{DateTime, Utc};
use flowrun_types::error::RepositoryError;
use flowrun_types::run::{RunPatch, RunSnapshot, WaitingRun};

/// Storage interface for persisted run snapshots.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait RunStore: Send + Sync {
    /// Load a run by execution id.
    fn find(
        &self,
        execution_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<RunSnapshot>, RepositoryError>> + Send;

    /// Apply a partial update. Fails with `NotFound` for unknown ids.
    fn update(
        &self,
        execution_id: &str,
        patch: RunPatch,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Unfinished runs whose wake time is at or before `before`, earliest first.
    fn find_waiting(
        &self,
        before: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Vec<WaitingRun>, RepositoryError>> + Send;

    /// Ids of runs that never reached a terminal state, are not parked and
    /// were not already marked crashed.
    fn list_unfinished(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<String>, RepositoryError>> + Send;
}
