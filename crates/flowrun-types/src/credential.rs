//! Credential material handed to outbound requests and resumed runs.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Decrypted key/value credential fields (`token`, `user`, `password`, ...).
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialData(BTreeMap<String, String>);

impl CredentialData {
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Field map for exposure to expressions (`$credentials`).
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CredentialData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Never print credential values.
impl fmt::Debug for CredentialData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|k| (k, "[REDACTED]")))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_values() {
        let cred: CredentialData = [("token", "s3cr3t")].into_iter().collect();
        let debug = format!("{cred:?}");
        assert!(debug.contains("token"));
        assert!(!debug.contains("s3cr3t"));
    }

    #[test]
    fn serializes_as_plain_map() {
        let cred: CredentialData = [("user", "alice")].into_iter().collect();
        let json = serde_json::to_value(&cred).unwrap();
        assert_eq!(json, serde_json::json!({ "user": "alice" }));
    }
}
