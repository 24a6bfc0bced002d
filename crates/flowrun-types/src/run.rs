//! Run data model: items, lineage references, per-node task records and the
//! persisted run snapshot.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::Graph;

// ---------------------------------------------------------------------------
// Items and lineage
// ---------------------------------------------------------------------------

/// The unit of data flowing between nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Arbitrary JSON payload, normally an object.
    pub json: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<BTreeMap<String, BinaryRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paired_item: Option<PairedItem>,
    /// Set on error items produced under continue-on-failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Item {
    pub fn new(json: Value) -> Self {
        Self {
            json,
            ..Self::default()
        }
    }

    /// Builder-style lineage annotation pointing at input item `item`.
    pub fn paired_with(mut self, item: usize) -> Self {
        self.paired_item = Some(PairedItem::Single(PairedItemRef::new(item)));
        self
    }
}

/// A binary payload attached to an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryRef {
    /// Base64 encoded content.
    pub data: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub file_size: usize,
}

/// Points at the item of the producing node's input that an item derives from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedItemRef {
    pub item: usize,
    /// Input slot of the producing node. Absent means slot 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<usize>,
}

impl PairedItemRef {
    pub fn new(item: usize) -> Self {
        Self { item, input: None }
    }

    pub fn input_slot(&self) -> usize {
        self.input.unwrap_or(0)
    }
}

/// The lineage annotation of an item: a bare index, one reference, or
/// several candidate references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PairedItem {
    Index(usize),
    Single(PairedItemRef),
    Multiple(Vec<PairedItemRef>),
}

/// Identifies which upstream node, output slot and run fed an input slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    pub previous_node: String,
    #[serde(default)]
    pub previous_node_output: usize,
    #[serde(default)]
    pub previous_node_run: usize,
}

impl SourceRef {
    pub fn new(previous_node: impl Into<String>) -> Self {
        Self {
            previous_node: previous_node.into(),
            previous_node_output: 0,
            previous_node_run: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Task data
// ---------------------------------------------------------------------------

/// Status of one node run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeExecutionStatus {
    Unresolved,
    Success,
    Error,
    Crashed,
}

/// Error recorded on a task or on the run as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            description: None,
        }
    }
}

/// Output of a node run: one item list per output slot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskOutput {
    pub main: Vec<Vec<Item>>,
}

/// Record of one run of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskData {
    pub start_time: DateTime<Utc>,
    /// Milliseconds.
    pub execution_time: u64,
    pub execution_status: NodeExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    /// Absent when the output was never persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<TaskOutput>,
    /// One entry per input slot; `None` for slots that received nothing.
    #[serde(default)]
    pub source: Vec<Option<SourceRef>>,
}

impl TaskData {
    /// Items of the given output slot, if the task recorded any.
    pub fn output(&self, slot: usize) -> Option<&[Item]> {
        self.data
            .as_ref()
            .and_then(|d| d.main.get(slot))
            .map(Vec::as_slice)
    }
}

/// Per-node run history of a workflow execution.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunExecutionData {
    #[serde(default)]
    pub run_data: BTreeMap<String, Vec<TaskData>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_node_executed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}

impl RunExecutionData {
    /// Task list for a node; empty when the node never ran.
    pub fn tasks(&self, node: &str) -> &[TaskData] {
        self.run_data.get(node).map(Vec::as_slice).unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// Run snapshot
// ---------------------------------------------------------------------------

/// How a run was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Manual,
    Trigger,
    Webhook,
    Retry,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Manual => "manual",
            Self::Trigger => "trigger",
            Self::Webhook => "webhook",
            Self::Retry => "retry",
        };
        f.write_str(s)
    }
}

/// Lifecycle status of a persisted run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    New,
    Running,
    Waiting,
    Success,
    Error,
    Canceled,
    Crashed,
}

impl RunStatus {
    /// Whether the run reached an outcome that must not be overwritten.
    /// `Crashed` is excluded: a reconstructed crash may be reconstructed again.
    pub fn is_final(self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Canceled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Success => "success",
            Self::Error => "error",
            Self::Canceled => "canceled",
            Self::Crashed => "crashed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The persisted record of one workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub id: String,
    pub workflow: Graph,
    #[serde(default)]
    pub data: RunExecutionData,
    #[serde(default)]
    pub mode: ExecutionMode,
    pub status: RunStatus,
    #[serde(default)]
    pub finished: bool,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_till: Option<DateTime<Utc>>,
}

/// A partial update applied to a stored run. `None` leaves a field alone;
/// the nested options of nullable fields allow clearing them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunPatch {
    pub status: Option<RunStatus>,
    pub finished: Option<bool>,
    pub data: Option<RunExecutionData>,
    pub stopped_at: Option<Option<DateTime<Utc>>>,
    pub wait_till: Option<Option<DateTime<Utc>>>,
}

impl RunPatch {
    /// Apply the patch to an in-memory snapshot.
    pub fn apply_to(self, run: &mut RunSnapshot) {
        if let Some(status) = self.status {
            run.status = status;
        }
        if let Some(finished) = self.finished {
            run.finished = finished;
        }
        if let Some(data) = self.data {
            run.data = data;
        }
        if let Some(stopped_at) = self.stopped_at {
            run.stopped_at = stopped_at;
        }
        if let Some(wait_till) = self.wait_till {
            run.wait_till = wait_till;
        }
    }
}

/// A run parked until `wake_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingRun {
    pub execution_id: String,
    pub wake_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Terminal diagnostics
// ---------------------------------------------------------------------------

/// User-visible explanation attached to a run that ended abnormally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalDiagnostic {
    /// The node had no lifecycle events at all.
    NodeNeverStarted { node: String },
    /// The node started but never reported completion.
    NodeCrashed { node: String },
    /// An expression could not trace an item back to its origin.
    LineageUnresolved { node: String, detail: String },
}

impl fmt::Display for TerminalDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeNeverStarted { node } => {
                write!(f, "Workflow did not finish: node \"{node}\" never started")
            }
            Self::NodeCrashed { node } => write!(
                f,
                "Workflow did not finish, possible out-of-memory issue (node \"{node}\" crashed mid-execution)"
            ),
            Self::LineageUnresolved { node, detail } => write!(
                f,
                "Item lineage could not be resolved in node \"{node}\": {detail}"
            ),
        }
    }
}

impl From<TerminalDiagnostic> for TaskError {
    fn from(diagnostic: TerminalDiagnostic) -> Self {
        TaskError::new(diagnostic.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn paired_item_accepts_all_shapes() {
        let index: PairedItem = serde_json::from_value(json!(3)).unwrap();
        assert_eq!(index, PairedItem::Index(3));

        let single: PairedItem = serde_json::from_value(json!({ "item": 1 })).unwrap();
        assert_eq!(single, PairedItem::Single(PairedItemRef::new(1)));

        let multiple: PairedItem =
            serde_json::from_value(json!([{ "item": 0 }, { "item": 2, "input": 1 }])).unwrap();
        match multiple {
            PairedItem::Multiple(refs) => {
                assert_eq!(refs.len(), 2);
                assert_eq!(refs[1].input_slot(), 1);
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn item_omits_empty_optional_fields() {
        let item = Item::new(json!({ "id": 1 }));
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value, json!({ "json": { "id": 1 } }));
    }

    #[test]
    fn task_data_uses_camel_case() {
        let task: TaskData = serde_json::from_value(json!({
            "startTime": "2026-01-01T00:00:00Z",
            "executionTime": 12,
            "executionStatus": "success",
            "data": { "main": [[{ "json": {} }]] },
            "source": [null]
        }))
        .unwrap();
        assert_eq!(task.execution_time, 12);
        assert_eq!(task.output(0).map(<[Item]>::len), Some(1));
        assert!(task.output(1).is_none());
        assert_eq!(task.source, vec![None]);
    }

    #[test]
    fn patch_clears_nullable_fields() {
        let mut run = RunSnapshot {
            id: "1".to_string(),
            workflow: Graph {
                id: String::new(),
                name: "wf".to_string(),
                active: false,
                nodes: vec![],
                connections: vec![],
            },
            data: RunExecutionData::default(),
            mode: ExecutionMode::Manual,
            status: RunStatus::Waiting,
            finished: false,
            started_at: Utc::now(),
            stopped_at: None,
            wait_till: Some(Utc::now()),
        };
        RunPatch {
            status: Some(RunStatus::Canceled),
            wait_till: Some(None),
            ..RunPatch::default()
        }
        .apply_to(&mut run);
        assert_eq!(run.status, RunStatus::Canceled);
        assert!(run.wait_till.is_none());
    }

    #[test]
    fn final_statuses_exclude_crashed() {
        assert!(RunStatus::Success.is_final());
        assert!(RunStatus::Canceled.is_final());
        assert!(!RunStatus::Crashed.is_final());
        assert!(!RunStatus::Waiting.is_final());
    }

    #[test]
    fn diagnostics_render_distinct_messages() {
        let never = TerminalDiagnostic::NodeNeverStarted { node: "B".into() }.to_string();
        let crashed = TerminalDiagnostic::NodeCrashed { node: "B".into() }.to_string();
        let lineage = TerminalDiagnostic::LineageUnresolved {
            node: "B".into(),
            detail: "no definitive match".into(),
        }
        .to_string();
        assert!(never.contains("never started"));
        assert!(crashed.contains("crashed mid-execution"));
        assert!(lineage.contains("lineage could not be resolved"));
    }
}
