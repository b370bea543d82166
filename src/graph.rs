//! Structural graph model: nodes, connections, and validation.
//!
//! A [`Graph`] is an immutable, validated description of what to execute.
//! Construction checks the structural invariants once, so the scheduler never
//! has to defend against dangling endpoints or ambiguous inputs at runtime:
//!
//! - node ids are unique,
//! - every connection endpoint names an existing node,
//! - at most one connection terminates at any given input port (no fan-in).
//!
//! The [`ConnectionIndex`] is derived at construction and answers the two
//! lookups the engine makes constantly: "what feeds this port?" and "what
//! does this node feed?".
//!
//! # Examples
//!
//! ```rust
//! use portweave::graph::{Graph, Node};
//! use portweave::types::NodeType;
//!
//! let graph = Graph::builder()
//!     .add_node(Node::new("a", NodeType::Text))
//!     .add_node(Node::new("b", NodeType::Code))
//!     .connect("a", "output", "b", "input")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(graph.nodes().len(), 2);
//! assert!(graph
//!     .index()
//!     .connection_into(&"b".into(), &"input".into())
//!     .is_some());
//! ```

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{NodeId, NodeType, PortId};

/// Cap on split fan-out elements when a node does not set its own.
pub const DEFAULT_SPLIT_MAX: usize = 10;

/// One node of an executable graph.
///
/// `data` is the node's opaque configuration payload, interpreted only by its
/// [`crate::capability::NodeCapability`]. `position` is editor layout and has
/// no effect on execution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub node_type: NodeType,
    pub title: String,
    #[serde(default)]
    pub data: serde_json::Value,
    /// Fan-out cap for [`NodeType::SplitRun`] nodes; `None` means
    /// [`DEFAULT_SPLIT_MAX`]. Ignored for every other node type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_max: Option<usize>,
    #[serde(default)]
    pub position: (f32, f32),
}

impl Node {
    /// Create a node with an empty payload and a title derived from its type.
    pub fn new(id: impl Into<NodeId>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            node_type,
            title: node_type.to_string(),
            data: serde_json::Value::Null,
            split_max: None,
            position: (0.0, 0.0),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    #[must_use]
    pub fn with_split_max(mut self, max: usize) -> Self {
        self.split_max = Some(max);
        self
    }

    /// Effective fan-out cap for this node.
    #[must_use]
    pub fn split_cap(&self) -> usize {
        self.split_max.unwrap_or(DEFAULT_SPLIT_MAX)
    }
}

/// A directed connection from one node's output port to another node's
/// input port.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub from_node: NodeId,
    pub from_port: PortId,
    pub to_node: NodeId,
    pub to_port: PortId,
}

impl Connection {
    pub fn new(
        from_node: impl Into<NodeId>,
        from_port: impl Into<PortId>,
        to_node: impl Into<NodeId>,
        to_port: impl Into<PortId>,
    ) -> Self {
        Self {
            from_node: from_node.into(),
            from_port: from_port.into(),
            to_node: to_node.into(),
            to_port: to_port.into(),
        }
    }
}

/// Errors raised while validating a graph.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("duplicate node id: {id}")]
    #[diagnostic(code(portweave::graph::duplicate_node))]
    DuplicateNode { id: NodeId },

    #[error("connection references unknown node: {id}")]
    #[diagnostic(
        code(portweave::graph::unknown_node),
        help("every connection endpoint must name a node present in the graph")
    )]
    UnknownNode { id: NodeId },

    #[error("input port {node}.{port} has more than one incoming connection")]
    #[diagnostic(
        code(portweave::graph::ambiguous_input),
        help("an input port accepts at most one connection; merge upstream values in a node instead")
    )]
    AmbiguousInput { node: NodeId, port: PortId },
}

/// Per-node connection lookups, derived once at graph construction.
#[derive(Debug, Default)]
pub struct ConnectionIndex {
    incoming: FxHashMap<NodeId, Vec<Connection>>,
    outgoing: FxHashMap<NodeId, Vec<Connection>>,
}

impl ConnectionIndex {
    fn insert(&mut self, connection: &Connection) {
        self.incoming
            .entry(connection.to_node.clone())
            .or_default()
            .push(connection.clone());
        self.outgoing
            .entry(connection.from_node.clone())
            .or_default()
            .push(connection.clone());
    }

    /// Connections terminating at `node`, in graph declaration order.
    #[must_use]
    pub fn incoming(&self, node: &NodeId) -> &[Connection] {
        self.incoming.get(node).map_or(&[], Vec::as_slice)
    }

    /// Connections originating at `node`, in graph declaration order.
    #[must_use]
    pub fn outgoing(&self, node: &NodeId) -> &[Connection] {
        self.outgoing.get(node).map_or(&[], Vec::as_slice)
    }

    /// The unique connection feeding `node`.`port`, if one exists.
    #[must_use]
    pub fn connection_into(&self, node: &NodeId, port: &PortId) -> Option<&Connection> {
        self.incoming(node).iter().find(|c| &c.to_port == port)
    }
}

/// A validated, immutable executable graph.
#[derive(Debug)]
pub struct Graph {
    nodes: Vec<Node>,
    by_id: FxHashMap<NodeId, usize>,
    connections: Vec<Connection>,
    index: ConnectionIndex,
}

impl Graph {
    /// Validate nodes and connections into a `Graph`.
    pub fn new(nodes: Vec<Node>, connections: Vec<Connection>) -> Result<Self, GraphError> {
        let mut by_id = FxHashMap::default();
        for (position, node) in nodes.iter().enumerate() {
            if by_id.insert(node.id.clone(), position).is_some() {
                return Err(GraphError::DuplicateNode {
                    id: node.id.clone(),
                });
            }
        }

        let mut index = ConnectionIndex::default();
        let mut seen_inputs: FxHashMap<(NodeId, PortId), ()> = FxHashMap::default();
        for connection in &connections {
            for endpoint in [&connection.from_node, &connection.to_node] {
                if !by_id.contains_key(endpoint) {
                    return Err(GraphError::UnknownNode {
                        id: endpoint.clone(),
                    });
                }
            }
            let input = (connection.to_node.clone(), connection.to_port.clone());
            if seen_inputs.insert(input, ()).is_some() {
                return Err(GraphError::AmbiguousInput {
                    node: connection.to_node.clone(),
                    port: connection.to_port.clone(),
                });
            }
            index.insert(connection);
        }

        Ok(Self {
            nodes,
            by_id,
            connections,
            index,
        })
    }

    /// Start a fluent builder.
    #[must_use]
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    /// Nodes in declaration order. This order seeds the scheduler's pending
    /// set, which keeps runs deterministic for a given graph.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.by_id.get(id).map(|&position| &self.nodes[position])
    }

    #[must_use]
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    #[must_use]
    pub fn index(&self) -> &ConnectionIndex {
        &self.index
    }
}

/// Fluent construction for [`Graph`].
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
    connections: Vec<Connection>,
}

impl GraphBuilder {
    #[must_use]
    pub fn add_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    #[must_use]
    pub fn connect(
        mut self,
        from_node: impl Into<NodeId>,
        from_port: impl Into<PortId>,
        to_node: impl Into<NodeId>,
        to_port: impl Into<PortId>,
    ) -> Self {
        self.connections
            .push(Connection::new(from_node, from_port, to_node, to_port));
        self
    }

    pub fn build(self) -> Result<Graph, GraphError> {
        Graph::new(self.nodes, self.connections)
    }
}
