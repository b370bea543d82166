//! Control-flow pruning: propagating "branch not taken" without execution.
//!
//! When a branching node leaves a port [`PortOutcome::Excluded`], everything
//! downstream of that port must settle as excluded too, and must do so
//! *without* being processed. The pruner decides that, per ready node, from
//! two signals:
//!
//! 1. any gathered input outcome is `Excluded`, or
//! 2. any direct upstream node was itself wholly excluded.
//!
//! The second signal covers connections into ports the excluded upstream
//! never got to record. Exclusion is not an error: the node settles in the
//! same round with `Excluded` on every declared output port, which is what
//! keeps the marker flowing to its own consumers.

use crate::capability::PortCache;
use crate::graph::Graph;
use crate::store::ResultStore;
use crate::types::NodeId;
use crate::value::{PortOutcome, PortOutcomes};

/// Stateless exclusion queries over one run's graph and port cache.
pub struct ControlFlowPruner<'a> {
    graph: &'a Graph,
    ports: &'a PortCache,
}

impl<'a> ControlFlowPruner<'a> {
    #[must_use]
    pub fn new(graph: &'a Graph, ports: &'a PortCache) -> Self {
        Self { graph, ports }
    }

    /// Whether control flow excludes `node`, given its gathered inputs.
    #[must_use]
    pub fn is_excluded(&self, node: &NodeId, inputs: &PortOutcomes, store: &ResultStore) -> bool {
        if inputs.values().any(PortOutcome::is_excluded) {
            return true;
        }
        self.graph
            .index()
            .incoming(node)
            .iter()
            .any(|connection| store.node_excluded(&connection.from_node))
    }

    /// Outcomes to record for an excluded node: every declared output port
    /// marked [`PortOutcome::Excluded`].
    #[must_use]
    pub fn exclusion_outcomes(&self, node: &NodeId) -> PortOutcomes {
        self.ports
            .output_ports(node)
            .iter()
            .map(|port| (port.id.clone(), PortOutcome::Excluded))
            .collect()
    }
}
