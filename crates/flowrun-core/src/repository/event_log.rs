//! Lifecycle event log trait definition.

use flowrun_types::error::RepositoryError;
use flowrun_types::event::LifecycleEvent;

/// Read access to the write-ahead lifecycle event log.
pub trait EventLogReader: Send + Sync {
    /// All events recorded for one execution, in the order they were written.
    fn read(
        &self,
        execution_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<LifecycleEvent>, RepositoryError>> + Send;
}
