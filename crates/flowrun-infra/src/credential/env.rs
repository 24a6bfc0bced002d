//! Environment variable credential provider.
//!
//! A credential named `prod key` is read from `FLOWRUN_CRED_PROD_KEY`: the
//! name is upper-cased and every character outside `[A-Z0-9]` becomes `_`.
//! The variable holds a JSON object of credential fields.

use flowrun_core::repository::credential::CredentialProvider;
use flowrun_types::credential::CredentialData;
use flowrun_types::error::RepositoryError;
use serde_json::Value;

const PREFIX: &str = "FLOWRUN_CRED_";

/// Read-only credential provider backed by the process environment.
#[derive(Debug, Default)]
pub struct EnvCredentialProvider;

impl EnvCredentialProvider {
    pub fn new() -> Self {
        Self
    }

    /// Environment variable consulted for a credential name.
    pub fn var_name(name: &str) -> String {
        let suffix: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{PREFIX}{suffix}")
    }
}

fn parse_fields(var: &str, raw: &str) -> Result<CredentialData, RepositoryError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| RepositoryError::Query(format!("{var} is not valid JSON: {e}")))?;
    let Value::Object(fields) = value else {
        return Err(RepositoryError::Query(format!("{var} must hold a JSON object")));
    };
    Ok(fields
        .into_iter()
        .map(|(key, value)| match value {
            Value::String(s) => (key, s),
            other => (key, other.to_string()),
        })
        .collect())
}

impl CredentialProvider for EnvCredentialProvider {
    async fn get(&self, name: &str) -> Result<Option<CredentialData>, RepositoryError> {
        let var = Self::var_name(name);
        match std::env::var(&var) {
            Ok(raw) => parse_fields(&var, &raw).map(Some),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(std::env::VarError::NotUnicode(_)) => Err(RepositoryError::Query(format!(
                "{var} is not valid unicode"
            ))),
        }
    }
}
