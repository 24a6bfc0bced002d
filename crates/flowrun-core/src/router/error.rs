use flowrun_types::run::{TaskError, TerminalDiagnostic};
use serde_json::Value;
use thiserror::Error;

use crate::expression::ExpressionError;

/// Errors raised while building, sending or converting a routed request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("request returned status {status}: {message}")]
    Status {
        status: u16,
        message: String,
        body: Value,
    },

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error("invalid routing: {0}")]
    InvalidRouting(String),

    #[error("credentials error: {0}")]
    Credentials(String),

    #[error("hook failed: {0}")]
    Hook(String),
}

impl RequestError {
    /// Build a status error, pulling a message out of an error-shaped body.
    pub fn status(status: u16, body: Value) -> Self {
        let message = ["message", "error", "detail"]
            .iter()
            .find_map(|key| match body.get(key) {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Object(inner)) => inner
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .unwrap_or_else(|| format!("HTTP {status}"));
        Self::Status {
            status,
            message,
            body,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }

    /// Lineage diagnostic when the failure came from an unresolvable
    /// `pairedItem` lookup.
    pub fn diagnostic(&self, node: &str) -> Option<TerminalDiagnostic> {
        match self {
            Self::Expression(err) => err.diagnostic(node),
            _ => None,
        }
    }

    /// The error to record on the run or item when `node` fails with this.
    pub fn task_error(&self, node: &str) -> TaskError {
        match self.diagnostic(node) {
            Some(diagnostic) => diagnostic.into(),
            None => TaskError::new(self.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_extracts_message() {
        let err = RequestError::status(422, json!({ "error": { "message": "bad field" } }));
        assert_eq!(err.to_string(), "request returned status 422: bad field");

        let err = RequestError::status(500, json!("oops"));
        assert_eq!(err.to_string(), "request returned status 500: HTTP 500");
    }

    #[test]
    fn not_found_detection() {
        assert!(RequestError::status(404, Value::Null).is_not_found());
        assert!(!RequestError::status(400, Value::Null).is_not_found());
        assert!(!RequestError::Transport("x".into()).is_not_found());
    }

    #[test]
    fn lineage_failures_become_diagnostics() {
        use crate::expression::ExpressionErrorKind;

        let err = RequestError::from(ExpressionError::paired(
            ExpressionErrorKind::SourceMissing,
            "Could not resolve, as source data is missing",
        ));
        assert_eq!(
            err.task_error("Api").message,
            "Item lineage could not be resolved in node \"Api\": Could not resolve, as source data is missing"
        );

        let err = RequestError::status(500, Value::Null);
        assert_eq!(err.diagnostic("Api"), None);
        assert_eq!(err.task_error("Api").message, "request returned status 500: HTTP 500");
    }
}
