//! Core identifier types for the Portweave execution engine.
//!
//! This module defines the fundamental types used throughout the engine for
//! naming nodes and ports in an executable graph. These are the core domain
//! concepts that define what a graph *is*; the value model lives in
//! [`crate::value`] and the structural model in [`crate::graph`].
//!
//! # Key Types
//!
//! - [`NodeId`] / [`PortId`]: opaque identifiers for nodes and their ports
//! - [`NodeType`]: the closed set of node types the engine knows about
//!
//! # Examples
//!
//! ```rust
//! use portweave::types::{NodeId, NodeType, PortId};
//!
//! let id: NodeId = "extract-1".into();
//! let port: PortId = "output".into();
//!
//! assert!(NodeType::SplitRun.is_split_run());
//! assert!(!NodeType::Text.is_user_input());
//! println!("{id}.{port}");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier for a node within a graph.
///
/// Node ids are assigned by whoever authors the graph; the engine only
/// requires them to be unique within one [`crate::graph::Graph`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Developer Experience: allow using string literals where a NodeId is expected.
impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId(s)
    }
}

/// Opaque identifier for an input or output port on a node.
///
/// Port ids are declared by a node's [`crate::capability::NodeCapability`]
/// and referenced by [`crate::graph::Connection`] endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortId(pub String);

impl PortId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PortId {
    fn from(s: &str) -> Self {
        PortId(s.to_string())
    }
}

impl From<String> for PortId {
    fn from(s: String) -> Self {
        PortId(s)
    }
}

/// The closed set of node types the engine can execute.
///
/// The scheduler special-cases exactly two variants: [`UserInput`] nodes are
/// batched into one external request per round, and [`SplitRun`] nodes are
/// expanded over their array input instead of being invoked directly. Every
/// other variant is dispatched uniformly through the
/// [`crate::capability::CapabilityRegistry`].
///
/// [`UserInput`]: NodeType::UserInput
/// [`SplitRun`]: NodeType::SplitRun
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    /// Produces a fixed or interpolated text value.
    Text,
    /// Assembles a prompt message from text inputs.
    Prompt,
    /// Calls a conversational model with assembled messages.
    Chat,
    /// Extracts capture groups from text via a regular expression.
    ExtractRegex,
    /// Runs a user-supplied code snippet over its inputs.
    Code,
    /// Tests text against a series of patterns, emitting on the first match.
    Match,
    /// Routes a value to one of two branches, excluding the other.
    If,
    /// Suspends the run to collect answers from an external source.
    UserInput,
    /// Fans its array input out over the downstream fragment.
    SplitRun,
}

impl NodeType {
    /// Returns `true` for nodes that participate in the per-round batched
    /// user-input request.
    #[must_use]
    pub fn is_user_input(&self) -> bool {
        matches!(self, Self::UserInput)
    }

    /// Returns `true` for nodes the scheduler expands over an array input
    /// rather than invoking directly.
    #[must_use]
    pub fn is_split_run(&self) -> bool {
        matches!(self, Self::SplitRun)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Text => "text",
            Self::Prompt => "prompt",
            Self::Chat => "chat",
            Self::ExtractRegex => "extractRegex",
            Self::Code => "code",
            Self::Match => "match",
            Self::If => "if",
            Self::UserInput => "userInput",
            Self::SplitRun => "splitRun",
        };
        write!(f, "{label}")
    }
}
