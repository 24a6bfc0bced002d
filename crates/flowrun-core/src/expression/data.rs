//! Read-only view of a run used while resolving expressions.
//!
//! `WorkflowData` is the explicit accessor interface expressions evaluate
//! against. Every accessor reads straight from the borrowed graph and run
//! data; nothing is copied until an expression asks for it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use flowrun_types::graph::{Graph, Node};
use flowrun_types::run::{ExecutionMode, Item, RunExecutionData, SourceRef, TaskData};
use serde_json::{Map, Value};

use super::error::{ExpressionError, ExpressionErrorKind};

/// Parameter expressions may reference each other this deep.
pub(crate) const MAX_RESOLVE_DEPTH: usize = 16;

static EMPTY_ENV: BTreeMap<String, String> = BTreeMap::new();

/// Everything an expression evaluated inside `active_node` can see.
#[derive(Debug)]
pub struct WorkflowData<'a> {
    graph: &'a Graph,
    active_node: &'a Node,
    run_data: Option<&'a RunExecutionData>,
    input: &'a [Item],
    input_source: &'a [Option<SourceRef>],
    run_index: usize,
    item_index: usize,
    /// Run to read when an accessor gets no explicit run index. `None` is the
    /// latest run.
    default_run_index: Option<usize>,
    mode: ExecutionMode,
    env: &'a BTreeMap<String, String>,
    additional_keys: Map<String, Value>,
    now: DateTime<Utc>,
    depth: AtomicUsize,
}

impl<'a> WorkflowData<'a> {
    /// View the run from inside `active_node`.
    pub fn new(graph: &'a Graph, active_node: &str) -> Result<Self, ExpressionError> {
        let node = graph.node(active_node).ok_or_else(|| unknown_node(active_node))?;
        Ok(Self {
            graph,
            active_node: node,
            run_data: None,
            input: &[],
            input_source: &[],
            run_index: 0,
            item_index: 0,
            default_run_index: None,
            mode: ExecutionMode::default(),
            env: &EMPTY_ENV,
            additional_keys: Map::new(),
            now: Utc::now(),
            depth: AtomicUsize::new(0),
        })
    }

    pub fn with_run_data(mut self, run_data: &'a RunExecutionData) -> Self {
        self.run_data = Some(run_data);
        self
    }

    /// Items the active node received on input 0 and where they came from.
    pub fn with_input(mut self, items: &'a [Item], source: &'a [Option<SourceRef>]) -> Self {
        self.input = items;
        self.input_source = source;
        self
    }

    pub fn at(mut self, run_index: usize, item_index: usize) -> Self {
        self.run_index = run_index;
        self.item_index = item_index;
        self
    }

    pub fn with_default_run_index(mut self, run_index: usize) -> Self {
        self.default_run_index = Some(run_index);
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_env(mut self, env: &'a BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Extra roots visible to expressions, addressed as `$key`.
    pub fn with_additional_key(mut self, key: impl Into<String>, value: Value) -> Self {
        self.additional_keys.insert(key.into(), value);
        self
    }

    /// Same view, repositioned on another item.
    pub fn for_item(&self, item_index: usize) -> Self {
        Self {
            graph: self.graph,
            active_node: self.active_node,
            run_data: self.run_data,
            input: self.input,
            input_source: self.input_source,
            run_index: self.run_index,
            item_index,
            default_run_index: self.default_run_index,
            mode: self.mode,
            env: self.env,
            additional_keys: self.additional_keys.clone(),
            now: self.now,
            depth: AtomicUsize::new(0),
        }
    }

    /// Same view and item with extra `$key` roots layered on top.
    pub fn scoped<K: Into<String>>(&self, keys: impl IntoIterator<Item = (K, Value)>) -> Self {
        let mut view = self.for_item(self.item_index);
        for (key, value) in keys {
            view.additional_keys.insert(key.into(), value);
        }
        view
    }

    // -----------------------------------------------------------------------
    // Simple accessors
    // -----------------------------------------------------------------------

    pub fn graph(&self) -> &'a Graph {
        self.graph
    }

    pub fn active_node(&self) -> &'a Node {
        self.active_node
    }

    pub fn run_index(&self) -> usize {
        self.run_index
    }

    pub fn item_index(&self) -> usize {
        self.item_index
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn input_items(&self) -> &'a [Item] {
        self.input
    }

    pub fn additional_key(&self, key: &str) -> Option<&Value> {
        self.additional_keys.get(key)
    }

    pub fn env(&self, key: &str) -> Option<&'a str> {
        self.env.get(key).map(String::as_str)
    }

    pub fn env_vars(&self) -> &'a BTreeMap<String, String> {
        self.env
    }

    /// `{ id, name, active }` of the workflow. Nothing else is exposed.
    pub fn workflow_meta(&self) -> Value {
        serde_json::json!({
            "id": self.graph.id,
            "name": self.graph.name,
            "active": self.graph.active,
        })
    }

    /// The current input item.
    pub fn current_item(&self) -> Result<&'a Item, ExpressionError> {
        self.input.get(self.item_index).ok_or_else(|| {
            self.located(ExpressionError::new(
                ExpressionErrorKind::ItemNotFound,
                format!("No data found for item-index: \"{}\"", self.item_index),
            ))
        })
    }

    /// JSON payload of the current input item.
    pub fn json(&self) -> Result<&'a Value, ExpressionError> {
        self.current_item().map(|item| &item.json)
    }

    /// Raw (unresolved) parameter of the active node.
    pub fn raw_parameter(&self, name: &str) -> Option<&'a Value> {
        self.active_node.parameters.get(name)
    }

    /// Resolved parameter of the active node. Nested expressions are
    /// resolved; a missing parameter is `Null`.
    pub fn parameter(&self, name: &str) -> Result<Value, ExpressionError> {
        match self.raw_parameter(name) {
            Some(raw) => super::resolver::resolve_value(raw, self),
            None => Ok(Value::Null),
        }
    }

    // -----------------------------------------------------------------------
    // Node output access
    // -----------------------------------------------------------------------

    /// Number of recorded runs of `node`.
    pub fn node_run_count(&self, node: &str) -> usize {
        self.run_data.map_or(0, |data| data.tasks(node).len())
    }

    /// Task record of `node`'s run `run` (default run when `None`).
    pub fn node_task(&self, node: &str, run: Option<usize>) -> Result<&'a TaskData, ExpressionError> {
        let run_data = self.run_data.ok_or_else(|| {
            self.located(ExpressionError::new(
                ExpressionErrorKind::NoExecutionData,
                "Workflow did not run so do not have any execution-data.",
            ))
        })?;

        let tasks = run_data.tasks(node);
        if tasks.is_empty() {
            return Err(self.located(if self.graph.node(node).is_some() {
                ExpressionError::new(
                    ExpressionErrorKind::NodeNotExecuted,
                    format!(
                        "The node \"{node}\" hasn't been executed yet, so you can't reference its output data"
                    ),
                )
            } else {
                unknown_node(node)
            }));
        }

        let run = run.or(self.default_run_index).unwrap_or(tasks.len() - 1);
        tasks.get(run).ok_or_else(|| {
            self.located(ExpressionError::new(
                ExpressionErrorKind::RunNotFound,
                format!("Run {run} of node \"{node}\" not found"),
            ))
        })
    }

    /// Items `node` emitted on `output` during run `run`.
    ///
    /// Without an explicit output slot, the slot through which `node` feeds
    /// the active node is used; a node that does not feed the active node
    /// is an error in that case.
    pub fn node_output(
        &self,
        node: &str,
        output: Option<usize>,
        run: Option<usize>,
    ) -> Result<&'a [Item], ExpressionError> {
        if self.graph.node(node).is_none() {
            return Err(self.located(unknown_node(node)));
        }
        let task = self.node_task(node, run)?;

        let main = match &task.data {
            Some(data) if !data.main.is_empty() => &data.main,
            _ => {
                return Err(self.located(ExpressionError::new(
                    ExpressionErrorKind::NoOutputData,
                    "No data found from \"main\" input.",
                )));
            }
        };

        let slot = match output {
            Some(slot) => slot,
            None if node == self.active_node.name => 0,
            None => self
                .graph
                .connection_output_index(&self.active_node.name, node)
                .ok_or_else(|| {
                    self.located(ExpressionError::new(
                        ExpressionErrorKind::NotConnected,
                        format!(
                            "The node \"{node}\" is not connected with node \"{}\" so no data can get returned from it.",
                            self.active_node.name
                        ),
                    ))
                })?,
        };

        main.get(slot).map(Vec::as_slice).ok_or_else(|| {
            self.located(ExpressionError::new(
                ExpressionErrorKind::NoOutputBranch,
                format!("Node \"{node}\" has no branch with index {slot}."),
            ))
        })
    }

    /// One item of `node`'s output. Defaults to the current item index.
    pub fn node_item(
        &self,
        node: &str,
        item: Option<usize>,
        output: Option<usize>,
        run: Option<usize>,
    ) -> Result<&'a Item, ExpressionError> {
        let index = item.unwrap_or(self.item_index);
        self.node_output(node, output, run)?
            .get(index)
            .ok_or_else(|| {
                self.located(ExpressionError::new(
                    ExpressionErrorKind::ItemNotFound,
                    format!("No data found for item-index: \"{index}\" of node \"{node}\""),
                ))
            })
    }

    // -----------------------------------------------------------------------
    // Internals shared with the lineage walk and the resolver
    // -----------------------------------------------------------------------

    pub(crate) fn run_data(&self) -> Option<&'a RunExecutionData> {
        self.run_data
    }

    pub(crate) fn input_source(&self) -> &'a [Option<SourceRef>] {
        self.input_source
    }

    /// Attach the current run and item position to an error.
    pub(crate) fn located(&self, err: ExpressionError) -> ExpressionError {
        err.at(self.run_index, self.item_index)
    }

    /// Enter one level of nested resolution.
    pub(crate) fn descend(&self) -> Result<DepthGuard<'_>, ExpressionError> {
        let depth = self.depth.load(Ordering::Relaxed) + 1;
        if depth > MAX_RESOLVE_DEPTH {
            return Err(self.located(ExpressionError::new(
                ExpressionErrorKind::RecursionLimit,
                "Expression references itself or nests too deeply",
            )));
        }
        self.depth.store(depth, Ordering::Relaxed);
        Ok(DepthGuard { depth: &self.depth })
    }
}

/// Restores the nesting depth on drop.
pub(crate) struct DepthGuard<'g> {
    depth: &'g AtomicUsize,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::Relaxed);
    }
}

fn unknown_node(node: &str) -> ExpressionError {
    ExpressionError::new(
        ExpressionErrorKind::UnknownNode,
        format!("No node called \"{node}\" in this workflow"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{chain_graph, chain_run_data};
    use serde_json::json;

    #[test]
    fn new_rejects_unknown_active_node() {
        let graph = chain_graph();
        let err = WorkflowData::new(&graph, "Nope").unwrap_err();
        assert_eq!(err.kind, ExpressionErrorKind::UnknownNode);
    }

    #[test]
    fn node_output_without_run_data() {
        let graph = chain_graph();
        let data = WorkflowData::new(&graph, "C").unwrap();
        let err = data.node_output("A", None, None).unwrap_err();
        assert_eq!(err.kind, ExpressionErrorKind::NoExecutionData);
        assert_eq!(
            err.message,
            "Workflow did not run so do not have any execution-data."
        );
    }

    #[test]
    fn not_executed_differs_from_unknown() {
        let graph = chain_graph();
        let mut run = chain_run_data();
        run.run_data.remove("B");
        let data = WorkflowData::new(&graph, "C").unwrap().with_run_data(&run);

        let not_run = data.node_output("B", None, None).unwrap_err();
        assert_eq!(not_run.kind, ExpressionErrorKind::NodeNotExecuted);
        assert!(not_run.message.contains("hasn't been executed yet"));

        let unknown = data.node_output("Z", None, None).unwrap_err();
        assert_eq!(unknown.kind, ExpressionErrorKind::UnknownNode);
        assert_eq!(unknown.message, "No node called \"Z\" in this workflow");
    }

    #[test]
    fn node_output_defaults_to_latest_run_and_connected_slot() {
        let graph = chain_graph();
        let run = chain_run_data();
        let data = WorkflowData::new(&graph, "C").unwrap().with_run_data(&run);

        let items = data.node_output("A", None, None).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[2].json, json!({ "n": 2 }));
    }

    #[test]
    fn run_index_past_history_is_an_error() {
        let graph = chain_graph();
        let run = chain_run_data();
        let data = WorkflowData::new(&graph, "C").unwrap().with_run_data(&run);

        let err = data.node_output("A", None, Some(4)).unwrap_err();
        assert_eq!(err.kind, ExpressionErrorKind::RunNotFound);
        assert_eq!(err.message, "Run 4 of node \"A\" not found");
    }

    #[test]
    fn unconnected_node_needs_explicit_slot() {
        let mut graph = chain_graph();
        graph
            .nodes
            .push(flowrun_types::graph::Node::new("Side", "core.noop"));
        let mut run = chain_run_data();
        run.run_data.insert("Side".to_string(), run.run_data["A"].clone());
        let data = WorkflowData::new(&graph, "C").unwrap().with_run_data(&run);

        let err = data.node_output("Side", None, None).unwrap_err();
        assert_eq!(err.kind, ExpressionErrorKind::NotConnected);

        assert_eq!(data.node_output("Side", Some(0), None).unwrap().len(), 3);
        let err = data.node_output("Side", Some(3), None).unwrap_err();
        assert_eq!(err.kind, ExpressionErrorKind::NoOutputBranch);
        assert_eq!(err.message, "Node \"Side\" has no branch with index 3.");
    }

    #[test]
    fn node_item_defaults_to_current_item() {
        let graph = chain_graph();
        let run = chain_run_data();
        let data = WorkflowData::new(&graph, "C")
            .unwrap()
            .with_run_data(&run)
            .at(0, 1);

        assert_eq!(data.node_item("A", None, None, None).unwrap().json, json!({ "n": 1 }));
        let err = data.node_item("A", Some(9), None, None).unwrap_err();
        assert_eq!(err.kind, ExpressionErrorKind::ItemNotFound);
        assert_eq!(err.item_index, Some(1));
    }

    #[test]
    fn workflow_meta_exposes_only_identity() {
        let graph = chain_graph();
        let data = WorkflowData::new(&graph, "A").unwrap();
        let meta = data.workflow_meta();
        assert_eq!(meta.as_object().map(Map::len), Some(3));
        assert_eq!(meta["name"], json!("chain"));
    }

    #[test]
    fn depth_guard_restores_on_drop() {
        let graph = chain_graph();
        let data = WorkflowData::new(&graph, "A").unwrap();
        {
            let _a = data.descend().unwrap();
            let _b = data.descend().unwrap();
            assert_eq!(data.depth.load(Ordering::Relaxed), 2);
        }
        assert_eq!(data.depth.load(Ordering::Relaxed), 0);
    }
}
