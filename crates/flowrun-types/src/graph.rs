//! Workflow graph types: nodes, connections, and connection lookups.
//!
//! A [`Graph`] is the static description of a workflow. Nodes are kept in
//! declaration order, which is the order recovery walks them in.

use std::collections::{BTreeMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::GraphError;

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// A workflow graph: named nodes plus directed connections between their slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Graph {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub active: bool,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

/// A single node of a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique within the graph.
    pub name: String,
    /// Type tag, e.g. `core.manualTrigger` or `http.request`.
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Credential type to credential name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub credentials: BTreeMap<String, String>,
    #[serde(default)]
    pub continue_on_fail: bool,
    #[serde(default)]
    pub disabled: bool,
}

/// A directed edge from an output slot of one node to an input slot of another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub source: String,
    #[serde(default)]
    pub source_output: usize,
    pub destination: String,
    #[serde(default)]
    pub destination_input: usize,
}

impl Node {
    /// Create a node with no parameters or credentials.
    pub fn new(name: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node_type: node_type.into(),
            parameters: Map::new(),
            credentials: BTreeMap::new(),
            continue_on_fail: false,
            disabled: false,
        }
    }

    /// Builder-style parameter setter.
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        if let Value::Object(map) = parameters {
            self.parameters = map;
        }
        self
    }
}

impl Connection {
    /// Connect output 0 of `source` to input 0 of `destination`.
    pub fn main(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            source_output: 0,
            destination: destination.into(),
            destination_input: 0,
        }
    }
}

impl Graph {
    /// Look up a node by name.
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Connections whose destination is `name`.
    pub fn incoming<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.destination == name)
    }

    /// Check structural consistency: unique node names and connections that
    /// only reference existing nodes.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.name.as_str()) {
                return Err(GraphError::DuplicateNode(node.name.clone()));
            }
        }
        for conn in &self.connections {
            for end in [&conn.source, &conn.destination] {
                if !seen.contains(end.as_str()) {
                    return Err(GraphError::UnknownNode(end.clone()));
                }
            }
        }
        Ok(())
    }

    /// Find the output slot of `requested` that (directly or transitively)
    /// feeds `active`.
    ///
    /// Walks upstream from `active` breadth-first and returns the source slot
    /// of the first edge leaving `requested`. Returns `None` when the two
    /// nodes are not connected.
    pub fn connection_output_index(&self, active: &str, requested: &str) -> Option<usize> {
        let mut queue = VecDeque::from([active]);
        let mut visited = HashSet::from([active]);

        while let Some(current) = queue.pop_front() {
            for conn in self.incoming(current) {
                if conn.source == requested {
                    return Some(conn.source_output);
                }
                if visited.insert(conn.source.as_str()) {
                    queue.push_back(conn.source.as_str());
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chain() -> Graph {
        Graph {
            id: "wf-1".to_string(),
            name: "chain".to_string(),
            active: false,
            nodes: vec![
                Node::new("A", "core.manualTrigger"),
                Node::new("B", "core.filter"),
                Node::new("C", "http.request"),
            ],
            connections: vec![
                Connection {
                    source: "A".to_string(),
                    source_output: 1,
                    destination: "B".to_string(),
                    destination_input: 0,
                },
                Connection::main("B", "C"),
            ],
        }
    }

    #[test]
    fn validate_accepts_consistent_graph() {
        assert!(chain().validate().is_ok());
    }

    #[test]
    fn validate_rejects_duplicate_names() {
        let mut graph = chain();
        graph.nodes.push(Node::new("B", "core.noop"));
        assert!(matches!(graph.validate(), Err(GraphError::DuplicateNode(n)) if n == "B"));
    }

    #[test]
    fn validate_rejects_dangling_connection() {
        let mut graph = chain();
        graph.connections.push(Connection::main("C", "Z"));
        assert!(matches!(graph.validate(), Err(GraphError::UnknownNode(n)) if n == "Z"));
    }

    #[test]
    fn connection_output_index_walks_transitively() {
        let graph = chain();
        assert_eq!(graph.connection_output_index("C", "B"), Some(0));
        assert_eq!(graph.connection_output_index("C", "A"), Some(1));
        assert_eq!(graph.connection_output_index("A", "C"), None);
    }

    #[test]
    fn connection_output_index_survives_cycles() {
        let mut graph = chain();
        graph.connections.push(Connection::main("C", "B"));
        assert_eq!(graph.connection_output_index("B", "A"), Some(1));
        assert_eq!(graph.connection_output_index("A", "B"), None);
    }

    #[test]
    fn node_deserializes_with_defaults() {
        let node: Node = serde_json::from_value(json!({
            "name": "Fetch",
            "type": "http.request",
            "parameters": { "url": "https://example.com" }
        }))
        .unwrap();
        assert_eq!(node.node_type, "http.request");
        assert!(node.credentials.is_empty());
        assert!(!node.continue_on_fail);
    }
}
