//! The graph runner port the scheduler resumes runs through.

use std::collections::HashMap;

use flowrun_types::credential::CredentialData;
use flowrun_types::run::RunSnapshot;

use super::SchedulingError;

/// A parked run handed back to the runner, with the credentials its nodes
/// reference already decrypted.
#[derive(Debug, Clone)]
pub struct ResumeRequest {
    pub execution_id: String,
    pub snapshot: RunSnapshot,
    /// Credential name to credential data.
    pub credentials: HashMap<String, CredentialData>,
}

/// Continues execution of a previously parked run.
pub trait GraphRunner: Send + Sync {
    fn resume(
        &self,
        request: ResumeRequest,
    ) -> impl std::future::Future<Output = Result<(), SchedulingError>> + Send;
}
