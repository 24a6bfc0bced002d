//! Rebuilding a terminal snapshot from the lifecycle event log.
//!
//! Pure: no I/O, no clock. Everything, the stop time included, is derived
//! from the snapshot and the events, so reconstructing the same run twice
//! yields the same result.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use flowrun_types::event::{LifecycleEvent, LifecycleEventName};
use flowrun_types::graph::Graph;
use flowrun_types::run::{
    Item, NodeExecutionStatus, RunExecutionData, TaskData, TaskError, TaskOutput,
    TerminalDiagnostic,
};
use serde_json::json;

use super::ReconstructionError;

/// Output placeholder for nodes that finished but whose data was lost.
pub const INTERRUPTED_MESSAGE: &str =
    "The execution was interrupted, so the data was not saved. Try fixing the workflow and re-executing.";

/// Error message on a node that started but never finished.
pub const NODE_CRASHED_MESSAGE: &str = "Node crashed, possible out-of-memory issue";

const NODE_CRASHED_DESCRIPTION: &str =
    "Execution stopped at this node. The process may have run out of memory while executing it.";

/// Result of [`reconstruct`].
#[derive(Debug, Clone, PartialEq)]
pub struct Reconstruction {
    pub data: RunExecutionData,
    /// `None` only when the log holds no usable timestamp at all.
    pub stopped_at: Option<DateTime<Utc>>,
    /// Nodes the log shows as started but never finished, in graph order.
    pub crashed_nodes: Vec<String>,
}

/// What the event log says about one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeTrace {
    NeverStarted,
    Crashed {
        started: DateTime<Utc>,
    },
    Finished {
        started: DateTime<Utc>,
        finished: DateTime<Utc>,
    },
}

/// Validated view of an event log.
struct Timeline<'e> {
    events: &'e [LifecycleEvent],
    started: HashMap<&'e str, DateTime<Utc>>,
}

impl<'e> Timeline<'e> {
    fn new(events: &'e [LifecycleEvent]) -> Result<Self, ReconstructionError> {
        if let Some(i) = events
            .windows(2)
            .position(|pair| pair[1].timestamp < pair[0].timestamp)
        {
            return Err(ReconstructionError::MalformedEventLog(format!(
                "event {} is older than the event before it",
                i + 1
            )));
        }

        let mut started = HashMap::new();
        for (i, event) in events.iter().enumerate() {
            if !event.event_name.is_node_event() {
                continue;
            }
            let name = match event.node_name.as_deref() {
                Some(name) if !name.is_empty() => name,
                _ => {
                    return Err(ReconstructionError::MalformedEventLog(format!(
                        "node event {i} does not name a node"
                    )));
                }
            };
            // Ordered log: the last start seen is the latest.
            if event.event_name == LifecycleEventName::NodeStarted {
                started.insert(name, event.timestamp);
            }
        }
        Ok(Self { events, started })
    }

    fn trace(&self, node: &str) -> NodeTrace {
        let Some(&started) = self.started.get(node) else {
            return NodeTrace::NeverStarted;
        };
        let finished = self.events.iter().find(|e| {
            e.event_name == LifecycleEventName::NodeFinished
                && e.node_name.as_deref() == Some(node)
                && e.timestamp >= started
        });
        match finished {
            Some(event) => NodeTrace::Finished {
                started,
                finished: event.timestamp,
            },
            None => NodeTrace::Crashed { started },
        }
    }

    fn first(&self, matches: impl Fn(LifecycleEventName) -> bool) -> Option<DateTime<Utc>> {
        self.events
            .iter()
            .find(|e| matches(e.event_name))
            .map(|e| e.timestamp)
    }
}

/// Reconstruct the run data of an interrupted run.
///
/// Nodes whose type is in `trigger_types` are skipped, as are nodes that
/// already have recorded tasks. Other nodes get a synthesized task: success
/// with a placeholder item when the log shows them finishing, crashed when
/// it shows them starting only, and nothing when they never started.
pub fn reconstruct(
    graph: &Graph,
    snapshot: &RunExecutionData,
    events: &[LifecycleEvent],
    trigger_types: &[String],
) -> Result<Reconstruction, ReconstructionError> {
    let timeline = Timeline::new(events)?;
    let mut data = snapshot.clone();
    let mut crashed_nodes = Vec::new();
    let mut latest_crash: Option<DateTime<Utc>> = None;
    let mut never_started: Option<&str> = None;

    for node in &graph.nodes {
        if node.node_type.is_empty() {
            return Err(ReconstructionError::MissingNodeType(node.name.clone()));
        }
        if trigger_types.iter().any(|t| *t == node.node_type) {
            continue;
        }

        let trace = timeline.trace(&node.name);
        if let NodeTrace::Crashed { started } = trace {
            crashed_nodes.push(node.name.clone());
            latest_crash = latest_crash.max(Some(started));
            data.last_node_executed = Some(node.name.clone());
        }

        if !data.tasks(&node.name).is_empty() {
            continue;
        }

        let task = match trace {
            NodeTrace::NeverStarted => {
                never_started.get_or_insert(node.name.as_str());
                continue;
            }
            NodeTrace::Finished { started, finished } => TaskData {
                start_time: started,
                execution_time: (finished - started).num_milliseconds().max(0) as u64,
                execution_status: NodeExecutionStatus::Success,
                error: None,
                data: Some(TaskOutput {
                    main: vec![vec![Item::new(json!({ "message": INTERRUPTED_MESSAGE }))]],
                }),
                source: vec![None],
            },
            NodeTrace::Crashed { started } => TaskData {
                start_time: started,
                execution_time: 0,
                execution_status: NodeExecutionStatus::Crashed,
                error: Some(TaskError {
                    message: NODE_CRASHED_MESSAGE.to_string(),
                    description: Some(NODE_CRASHED_DESCRIPTION.to_string()),
                }),
                data: None,
                source: vec![None],
            },
        };
        data.run_data.insert(node.name.clone(), vec![task]);
    }

    if data.error.is_none() {
        let diagnostic = match (crashed_nodes.last(), never_started) {
            (Some(node), _) => Some(TerminalDiagnostic::NodeCrashed { node: node.clone() }),
            (None, Some(node)) => Some(TerminalDiagnostic::NodeNeverStarted {
                node: node.to_string(),
            }),
            (None, None) => None,
        };
        data.error = diagnostic.map(TaskError::from);
    }

    let stopped_at = latest_crash
        .or_else(|| timeline.first(LifecycleEventName::is_workflow_terminal))
        .or_else(|| timeline.first(|name| name == LifecycleEventName::WorkflowStarted));

    Ok(Reconstruction {
        data,
        stopped_at,
        crashed_nodes,
    })
}
