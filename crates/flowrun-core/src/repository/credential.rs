//! Credential provider trait definition.

use flowrun_types::credential::CredentialData;
use flowrun_types::error::RepositoryError;

/// Trait for credential backends.
///
/// Returns `None` when the named credential does not exist in this provider.
pub trait CredentialProvider: Send + Sync {
    fn get(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Option<CredentialData>, RepositoryError>> + Send;
}
