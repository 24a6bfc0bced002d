//! Lifecycle events written by the execution engine and push notifications
//! sent to clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of a lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleEventName {
    #[serde(rename = "workflow.started")]
    WorkflowStarted,
    #[serde(rename = "workflow.success")]
    WorkflowSuccess,
    #[serde(rename = "workflow.failed")]
    WorkflowFailed,
    #[serde(rename = "workflow.crashed")]
    WorkflowCrashed,
    #[serde(rename = "node.started")]
    NodeStarted,
    #[serde(rename = "node.finished")]
    NodeFinished,
    /// Any event this engine does not interpret.
    #[serde(other)]
    Other,
}

impl LifecycleEventName {
    /// Workflow-level events that mark the end of a run.
    pub fn is_workflow_terminal(self) -> bool {
        matches!(
            self,
            Self::WorkflowSuccess | Self::WorkflowFailed | Self::WorkflowCrashed
        )
    }

    pub fn is_node_event(self) -> bool {
        matches!(self, Self::NodeStarted | Self::NodeFinished)
    }
}

/// One entry of the write-ahead event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub execution_id: String,
    pub event_name: LifecycleEventName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn workflow(
        execution_id: impl Into<String>,
        event_name: LifecycleEventName,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            event_name,
            node_name: None,
            timestamp,
        }
    }

    pub fn node(
        execution_id: impl Into<String>,
        event_name: LifecycleEventName,
        node_name: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            event_name,
            node_name: Some(node_name.into()),
            timestamp,
        }
    }
}

/// Kind tag of the notification sent once a run reaches a terminal state.
pub const EXECUTION_FINISHED: &str = "executionFinished";

/// A message pushed to connected clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub kind: String,
    pub payload: Value,
    /// Execution the message concerns.
    pub target_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_names_use_dotted_tags() {
        let event: LifecycleEvent = serde_json::from_value(json!({
            "executionId": "42",
            "eventName": "node.started",
            "nodeName": "Fetch",
            "timestamp": "2026-03-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(event.event_name, LifecycleEventName::NodeStarted);
        assert_eq!(event.node_name.as_deref(), Some("Fetch"));
    }

    #[test]
    fn unknown_event_names_are_tolerated() {
        let name: LifecycleEventName = serde_json::from_value(json!("audit.user.login")).unwrap();
        assert_eq!(name, LifecycleEventName::Other);
        assert!(!name.is_node_event());
    }

    #[test]
    fn terminal_classification() {
        assert!(LifecycleEventName::WorkflowCrashed.is_workflow_terminal());
        assert!(!LifecycleEventName::WorkflowStarted.is_workflow_terminal());
    }
}
