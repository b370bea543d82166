//! Per-run bookkeeping: the write-once result store and the visited set.
//!
//! Both structures are owned by the scheduler and mutated only from its own
//! control flow at settlement points, never from inside node tasks. That is
//! what makes "write once per node per run" a checkable invariant instead of
//! a convention: a second write is a scheduler bug and surfaces as
//! [`StoreError::AlreadyRecorded`].

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::types::{NodeId, PortId};
use crate::value::{PortOutcome, PortOutcomes};

/// Recorded results of one node, plus whether control flow excluded the
/// node as a whole.
///
/// The distinction matters downstream: a branching node that produced one
/// port and excluded another is *not* wholly excluded, and only consumers of
/// the excluded port get pruned.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeRecord {
    pub outcomes: PortOutcomes,
    pub excluded: bool,
}

/// Write-once map from node id to its recorded port outcomes.
#[derive(Debug, Default)]
pub struct ResultStore {
    records: FxHashMap<NodeId, NodeRecord>,
}

impl ResultStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a node's outcomes after it settled normally.
    pub fn record(&mut self, node: NodeId, outcomes: PortOutcomes) -> Result<(), StoreError> {
        self.insert(
            node,
            NodeRecord {
                outcomes,
                excluded: false,
            },
        )
    }

    /// Record a node as wholly excluded by control flow.
    pub fn record_excluded(
        &mut self,
        node: NodeId,
        outcomes: PortOutcomes,
    ) -> Result<(), StoreError> {
        self.insert(
            node,
            NodeRecord {
                outcomes,
                excluded: true,
            },
        )
    }

    fn insert(&mut self, node: NodeId, record: NodeRecord) -> Result<(), StoreError> {
        if self.records.contains_key(&node) {
            return Err(StoreError::AlreadyRecorded { node });
        }
        self.records.insert(node, record);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, node: &NodeId) -> Option<&NodeRecord> {
        self.records.get(node)
    }

    /// The recorded outcome for one output port, if the node has settled
    /// and declared that port.
    #[must_use]
    pub fn outcome(&self, node: &NodeId, port: &PortId) -> Option<&PortOutcome> {
        self.records.get(node).and_then(|r| r.outcomes.get(port))
    }

    /// Whether control flow excluded `node` as a whole.
    #[must_use]
    pub fn node_excluded(&self, node: &NodeId) -> bool {
        self.records.get(node).is_some_and(|r| r.excluded)
    }

    /// Drain the records for the given nodes, keeping the rest in place.
    #[must_use]
    pub fn take_records_for<'a>(
        &mut self,
        nodes: impl IntoIterator<Item = &'a NodeId>,
    ) -> FxHashMap<NodeId, NodeRecord> {
        nodes
            .into_iter()
            .filter_map(|id| self.records.remove(id).map(|record| (id.clone(), record)))
            .collect()
    }
}

/// Nodes that have settled this run, each entered exactly once.
#[derive(Debug, Default)]
pub struct VisitedSet {
    nodes: FxHashSet<NodeId>,
}

impl VisitedSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a node settled. Returns `false` if it already was.
    pub fn mark(&mut self, node: NodeId) -> bool {
        self.nodes.insert(node)
    }

    #[must_use]
    pub fn contains(&self, node: &NodeId) -> bool {
        self.nodes.contains(node)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Violations of the store's write-once discipline.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("results for node {node} were already recorded this run")]
    #[diagnostic(
        code(portweave::store::already_recorded),
        help("each node settles exactly once per run; a second write is a scheduling bug")
    )]
    AlreadyRecorded { node: NodeId },
}
