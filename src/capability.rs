//! Node behavior: the capability trait, registry, and port cache.
//!
//! The engine itself knows nothing about what any node *does*. All behavior
//! is supplied through [`NodeCapability`] implementations, looked up by
//! [`NodeType`] in an explicit [`CapabilityRegistry`] that the caller
//! constructs and hands to the scheduler. There is no global registry; two
//! schedulers can run side by side with entirely different capability sets.
//!
//! Port declarations may depend on a node's payload and on which connections
//! touch it (a prompt node grows one input per template variable, for
//! example). The scheduler resolves them once per run into a [`PortCache`]
//! and treats the cached definitions as fixed for the rest of the run.
//!
//! # Implementing a capability
//!
//! ```rust
//! use async_trait::async_trait;
//! use portweave::capability::{CapabilityError, NodeCapability, PortDefinition};
//! use portweave::context::NodeContext;
//! use portweave::graph::{ConnectionIndex, Node};
//! use portweave::value::{DataType, DataValue, PortOutcome, PortOutcomes, PortValues, ScalarKind};
//!
//! struct Upper;
//!
//! #[async_trait]
//! impl NodeCapability for Upper {
//!     fn input_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
//!         vec![PortDefinition::required(
//!             "input",
//!             "Input",
//!             DataType::Scalar(ScalarKind::Text),
//!         )]
//!     }
//!
//!     fn output_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
//!         vec![PortDefinition::required(
//!             "output",
//!             "Output",
//!             DataType::Scalar(ScalarKind::Text),
//!         )]
//!     }
//!
//!     async fn process(
//!         &self,
//!         _node: &Node,
//!         inputs: &PortValues,
//!         _ctx: &NodeContext,
//!     ) -> Result<PortOutcomes, CapabilityError> {
//!         let text = inputs
//!             .get(&"input".into())
//!             .and_then(|v| v.as_scalar())
//!             .and_then(|s| s.as_text())
//!             .ok_or_else(|| CapabilityError::missing_input("input"))?;
//!         let mut out = PortOutcomes::default();
//!         out.insert(
//!             "output".into(),
//!             PortOutcome::Produced(DataValue::text(text.to_uppercase())),
//!         );
//!         Ok(out)
//!     }
//! }
//! ```
//!
//! Branching types record [`PortOutcome::Excluded`] on the ports they do not
//! take; the marker then flows along connections and the scheduler's pruner
//! excludes downstream nodes without invoking them.

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::context::{NodeContext, NodeContextError};
use crate::graph::{ConnectionIndex, Graph, Node};
use crate::types::{NodeId, NodeType, PortId};
use crate::value::{DataType, PortOutcomes, PortValues};

/// Declaration of one input or output port.
#[derive(Clone, Debug, PartialEq)]
pub struct PortDefinition {
    pub id: PortId,
    pub title: String,
    pub data_type: DataType,
    /// Required input ports gate readiness; optional ones do not.
    /// Meaningless for output ports.
    pub required: bool,
}

impl PortDefinition {
    pub fn required(id: impl Into<PortId>, title: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            data_type,
            required: true,
        }
    }

    pub fn optional(id: impl Into<PortId>, title: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            data_type,
            required: false,
        }
    }
}

/// Errors surfaced by capability implementations.
#[derive(Debug, Error, Diagnostic)]
pub enum CapabilityError {
    #[error("required input port not satisfied: {port}")]
    #[diagnostic(code(portweave::capability::missing_input))]
    MissingInput { port: PortId },

    #[error("invalid node payload: {detail}")]
    #[diagnostic(code(portweave::capability::invalid_payload))]
    InvalidPayload { detail: String },

    #[error("node type does not accept user-input answers")]
    #[diagnostic(
        code(portweave::capability::not_interactive),
        help("only interactive node types override outputs_from_answers")
    )]
    NotInteractive,

    #[error("processing failed: {message}")]
    #[diagnostic(code(portweave::capability::process_failed))]
    Failed { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Context(#[from] NodeContextError),
}

impl CapabilityError {
    pub fn missing_input(port: impl Into<PortId>) -> Self {
        Self::MissingInput { port: port.into() }
    }

    pub fn invalid_payload(detail: impl Into<String>) -> Self {
        Self::InvalidPayload {
            detail: detail.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Behavior contract for one node type.
#[async_trait]
pub trait NodeCapability: Send + Sync {
    /// Input ports for `node` given the connections touching it.
    fn input_ports(&self, node: &Node, index: &ConnectionIndex) -> Vec<PortDefinition>;

    /// Output ports for `node` given the connections touching it.
    ///
    /// A node declaring zero output ports is a graph output; its recorded
    /// values surface in the run result.
    fn output_ports(&self, node: &Node, index: &ConnectionIndex) -> Vec<PortDefinition>;

    /// Execute the node over its gathered input values.
    ///
    /// Returns one outcome per output port. Most types produce a value on
    /// every declared port; branching types mark untaken ports
    /// [`crate::value::PortOutcome::Excluded`].
    async fn process(
        &self,
        node: &Node,
        inputs: &PortValues,
        ctx: &NodeContext,
    ) -> Result<PortOutcomes, CapabilityError>;

    /// Convert externally collected answers into output values.
    ///
    /// Called instead of [`process`](Self::process) for nodes satisfied by
    /// the per-round user-input batch, with one answer string per question
    /// the node asked. Non-interactive types keep the default.
    fn outputs_from_answers(
        &self,
        _node: &Node,
        _inputs: &PortValues,
        _answers: &[String],
    ) -> Result<PortValues, CapabilityError> {
        Err(CapabilityError::NotInteractive)
    }
}

/// Explicit mapping from [`NodeType`] to behavior.
///
/// Built by the caller and passed into [`crate::scheduler::Scheduler::new`].
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    capabilities: FxHashMap<NodeType, Arc<dyn NodeCapability>>,
}

impl CapabilityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability for a node type, replacing any previous one.
    #[must_use]
    pub fn register(
        mut self,
        node_type: NodeType,
        capability: impl NodeCapability + 'static,
    ) -> Self {
        self.capabilities.insert(node_type, Arc::new(capability));
        self
    }

    #[must_use]
    pub fn get(&self, node_type: NodeType) -> Option<Arc<dyn NodeCapability>> {
        self.capabilities.get(&node_type).cloned()
    }

    #[must_use]
    pub fn contains(&self, node_type: NodeType) -> bool {
        self.capabilities.contains_key(&node_type)
    }
}

/// Resolved port definitions for every node of one run.
///
/// Built once at run start; the scheduler and its helpers read ports from
/// here instead of re-asking capabilities.
#[derive(Debug, Default)]
pub struct PortCache {
    inputs: FxHashMap<NodeId, Vec<PortDefinition>>,
    outputs: FxHashMap<NodeId, Vec<PortDefinition>>,
}

impl PortCache {
    /// Resolve ports for every node in `graph`.
    ///
    /// Fails with the offending node type when the registry has no entry
    /// for a node present in the graph.
    pub fn build(graph: &Graph, registry: &CapabilityRegistry) -> Result<Self, UnregisteredType> {
        let mut cache = Self::default();
        for node in graph.nodes() {
            let capability = registry
                .get(node.node_type)
                .ok_or(UnregisteredType(node.node_type))?;
            cache.inputs.insert(
                node.id.clone(),
                capability.input_ports(node, graph.index()),
            );
            cache.outputs.insert(
                node.id.clone(),
                capability.output_ports(node, graph.index()),
            );
        }
        Ok(cache)
    }

    #[must_use]
    pub fn input_ports(&self, node: &NodeId) -> &[PortDefinition] {
        self.inputs.get(node).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn output_ports(&self, node: &NodeId) -> &[PortDefinition] {
        self.outputs.get(node).map_or(&[], Vec::as_slice)
    }

    /// Whether `node` is a graph output (declares no output ports).
    #[must_use]
    pub fn is_graph_output(&self, node: &NodeId) -> bool {
        self.output_ports(node).is_empty()
    }
}

/// A graph contains a node type the registry does not cover.
#[derive(Debug, Error, Diagnostic)]
#[error("no capability registered for node type: {0}")]
#[diagnostic(
    code(portweave::capability::unregistered),
    help("register a capability for every node type the graph uses")
)]
pub struct UnregisteredType(pub NodeType);
