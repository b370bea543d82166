//! Readiness rules: which pending nodes a round may dispatch.
//!
//! Two separate questions are answered here.
//!
//! [`ReadinessEvaluator::is_ready`] asks whether a node's required inputs are
//! satisfied. A required input port is satisfied when it has no connection or
//! its source has settled; a source that is itself an unexpanded fan-out node
//! is evaluated transitively, because its fragment is what will actually
//! produce the value. A fan-out node carries one extra obligation: expanding
//! it invokes its whole fragment immediately, so the fan-out is only ready
//! once every required fragment input *other than the fan-out connection
//! itself* is satisfied too. Until then the expansion defers to a later
//! round. The recursion carries an explicit in-progress set: a node
//! re-entered during its own evaluation reports not-ready, so a true
//! dependency cycle stalls the frontier and the scheduler turns the stall
//! into a dependency error. No depth limit, no stack overflow.
//!
//! [`ReadinessEvaluator::can_run_directly`] asks whether the node may be
//! invoked on its own. Nodes directly fed by an unexpanded
//! [`crate::types::NodeType::SplitRun`] node may not; they only run inside
//! the expansion. Under round semantics a deeper descendant cannot become
//! ready before its fragment settles, so checking direct connections is
//! sufficient.

use rustc_hash::FxHashSet;

use crate::capability::PortCache;
use crate::graph::Graph;
use crate::store::VisitedSet;
use crate::types::{NodeId, PortId};

/// Stateless readiness queries over one run's graph and port cache.
pub struct ReadinessEvaluator<'a> {
    graph: &'a Graph,
    ports: &'a PortCache,
}

impl<'a> ReadinessEvaluator<'a> {
    #[must_use]
    pub fn new(graph: &'a Graph, ports: &'a PortCache) -> Self {
        Self { graph, ports }
    }

    /// Whether every required input of `node` is satisfied.
    #[must_use]
    pub fn is_ready(&self, node: &NodeId, visited: &VisitedSet) -> bool {
        let mut in_progress = FxHashSet::default();
        self.is_ready_inner(node, visited, &mut in_progress)
    }

    fn is_ready_inner(
        &self,
        node: &NodeId,
        visited: &VisitedSet,
        in_progress: &mut FxHashSet<NodeId>,
    ) -> bool {
        if !in_progress.insert(node.clone()) {
            // Re-entered while already under evaluation: a cycle.
            return false;
        }

        let mut ready = self.ports.input_ports(node).iter().all(|port| {
            !port.required || self.input_satisfied(node, &port.id, None, visited, in_progress)
        });

        // A fan-out node runs by invoking its fragment, so its readiness
        // extends to the fragment's other inputs.
        if ready
            && self
                .graph
                .node(node)
                .is_some_and(|n| n.node_type.is_split_run())
        {
            ready = self.fragment_inputs_ready(node, visited, in_progress);
        }

        in_progress.remove(node);
        ready
    }

    /// Whether one required input port of `node` is satisfied.
    ///
    /// `skip_from` names a source whose connection counts as satisfied
    /// regardless, used for the fan-out connection feeding a fragment node.
    fn input_satisfied(
        &self,
        node: &NodeId,
        port: &PortId,
        skip_from: Option<&NodeId>,
        visited: &VisitedSet,
        in_progress: &mut FxHashSet<NodeId>,
    ) -> bool {
        let Some(connection) = self.graph.index().connection_into(node, port) else {
            return true;
        };
        if skip_from == Some(&connection.from_node) {
            return true;
        }
        if visited.contains(&connection.from_node) {
            return true;
        }
        let source_is_split = self
            .graph
            .node(&connection.from_node)
            .is_some_and(|n| n.node_type.is_split_run());
        // An unsettled fan-out source counts as satisfied when it could
        // itself run; the expansion settles both in one round.
        source_is_split && self.is_ready_inner(&connection.from_node, visited, in_progress)
    }

    /// Whether every required input of every node directly fed by `split`,
    /// other than the fan-out connection itself, is satisfied.
    fn fragment_inputs_ready(
        &self,
        split: &NodeId,
        visited: &VisitedSet,
        in_progress: &mut FxHashSet<NodeId>,
    ) -> bool {
        self.graph.index().outgoing(split).iter().all(|fed| {
            self.ports.input_ports(&fed.to_node).iter().all(|port| {
                !port.required
                    || self.input_satisfied(
                        &fed.to_node,
                        &port.id,
                        Some(split),
                        visited,
                        in_progress,
                    )
            })
        })
    }

    /// Whether `node` may be invoked outside a fan-out expansion.
    #[must_use]
    pub fn can_run_directly(&self, node: &NodeId, visited: &VisitedSet) -> bool {
        self.graph.index().incoming(node).iter().all(|connection| {
            let unexpanded_split = self
                .graph
                .node(&connection.from_node)
                .is_some_and(|n| n.node_type.is_split_run())
                && !visited.contains(&connection.from_node);
            !unexpanded_split
        })
    }
}
