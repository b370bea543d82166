//! Fan-out expansion for [`crate::types::NodeType::SplitRun`] nodes.
//!
//! A fan-out node never processes anything itself. When it becomes ready,
//! the scheduler reads its expansion input (an array, or a scalar treated as
//! one element), truncates it to the node's cap
//! ([`crate::graph::DEFAULT_SPLIT_MAX`] unless overridden), and runs every
//! node directly fed by the fan-out (the *fragment*) once per element. The
//! fragment's per-element results merge back, port by port and in element
//! order, into array-typed outputs, so downstream consumers see ordinary
//! array values and never know an expansion happened.
//!
//! The fan-out node and its fragment all settle within the expanding round.
//! An empty array after truncation fails the run before any fragment node
//! is invoked.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::capability::CapabilityError;
use crate::event_bus::Event;
use crate::graph::Node;
use crate::pruner::ControlFlowPruner;
use crate::scheduler::{RunError, RunState, Scheduler};
use crate::types::{NodeId, PortId};
use crate::value::{
    values_from_outcomes, ArrayValue, DataValue, PortOutcome, PortOutcomes, ScalarValue,
};

impl Scheduler {
    /// Expand one ready fan-out node, settling it and its whole fragment.
    ///
    /// Fragment nodes that were independently ready this round are removed
    /// from `ordinary`; they only ever run inside the expansion.
    pub(crate) async fn expand_split<'g>(
        &self,
        state: &mut RunState<'g>,
        split: &'g Node,
        ordinary: &mut Vec<&'g Node>,
    ) -> Result<(), RunError> {
        let gathered = state.gather(&split.id);
        let pruner = ControlFlowPruner::new(state.graph, &state.ports);
        if pruner.is_excluded(&split.id, &gathered, &state.store) {
            let outcomes = pruner.exclusion_outcomes(&split.id);
            state.emit(Event::node_excluded(split.id.clone(), state.round));
            // Fragment nodes stay pending; they gather the excluded marker
            // from this node's ports next round.
            return state.settle_excluded(&split.id, outcomes);
        }

        let values = values_from_outcomes(&gathered);
        // The first connected input drives the expansion, scanned in
        // declared port order. A scalar expands as a single element.
        let mut elements: Option<ArrayValue> = state
            .ports
            .input_ports(&split.id)
            .iter()
            .find_map(|port| values.get(&port.id))
            .map(|value| match value {
                DataValue::Array(array) => array.clone(),
                DataValue::Scalar(scalar) => ArrayValue::from_scalars(vec![scalar.clone()]),
            });
        if let Some(array) = elements.as_mut() {
            array.truncate(split.split_cap());
        }
        let elements = match elements {
            Some(array) if !array.is_empty() => array,
            _ => {
                state.emit(Event::node_error(
                    split.id.clone(),
                    state.round,
                    "no elements to expand over",
                ));
                return Err(RunError::EmptySplitInput {
                    node: split.id.clone(),
                });
            }
        };

        state.emit(Event::node_start(split.id.clone(), state.round));
        tracing::debug!(
            node = %split.id,
            elements = elements.len(),
            cap = split.split_cap(),
            "expanding fan-out"
        );

        // The fragment: distinct direct targets, in connection order.
        let mut fragment: Vec<&'g Node> = Vec::new();
        for connection in state.graph.index().outgoing(&split.id) {
            if fragment.iter().any(|n| n.id == connection.to_node) {
                continue;
            }
            if let Some(node) = state.graph.node(&connection.to_node) {
                fragment.push(node);
            }
        }
        ordinary.retain(|node| !fragment.iter().any(|f| f.id == node.id));

        for node in fragment {
            self.run_fragment_node(state, split, node, &elements).await?;
        }

        // The fan-out node itself records the truncated array it expanded.
        let outcomes: PortOutcomes = state
            .ports
            .output_ports(&split.id)
            .iter()
            .map(|port| {
                (
                    port.id.clone(),
                    PortOutcome::Produced(DataValue::Array(elements.clone())),
                )
            })
            .collect();
        state.emit(Event::node_finish(split.id.clone(), state.round));
        state.settle(&split.id, outcomes)
    }

    /// Run one fragment node over every element and merge its results.
    async fn run_fragment_node<'g>(
        &self,
        state: &mut RunState<'g>,
        split: &'g Node,
        node: &'g Node,
        elements: &ArrayValue,
    ) -> Result<(), RunError> {
        // Split-fed input ports receive one element per invocation; every
        // other input gathers normally, once.
        let mut broadcast_ports: Vec<PortId> = Vec::new();
        let mut base_inputs = PortOutcomes::default();
        for port in state.ports.input_ports(&node.id) {
            let Some(connection) = state.graph.index().connection_into(&node.id, &port.id) else {
                continue;
            };
            if connection.from_node == split.id {
                broadcast_ports.push(port.id.clone());
            } else if let Some(outcome) = state
                .store
                .outcome(&connection.from_node, &connection.from_port)
            {
                base_inputs.insert(port.id.clone(), outcome.clone());
            }
        }

        let pruner = ControlFlowPruner::new(state.graph, &state.ports);
        let excluded_upstream = state
            .graph
            .index()
            .incoming(&node.id)
            .iter()
            .filter(|c| c.from_node != split.id)
            .any(|c| state.store.node_excluded(&c.from_node));
        if base_inputs.values().any(PortOutcome::is_excluded) || excluded_upstream {
            let outcomes = pruner.exclusion_outcomes(&node.id);
            state.emit(Event::node_excluded(node.id.clone(), state.round));
            return state.settle_excluded(&node.id, outcomes);
        }

        let capability = self.capability_for(node)?;
        state.emit(Event::node_start(node.id.clone(), state.round));

        let base_values = values_from_outcomes(&base_inputs);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let tasks = elements.items().iter().enumerate().map(|(index, element)| {
            let mut values = base_values.clone();
            for port in &broadcast_ports {
                values.insert(port.clone(), DataValue::Scalar(element.clone()));
            }
            let capability = capability.clone();
            let ctx = state.node_ctx(&node.id, Some(index));
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire_owned().await.ok();
                capability.process(node, &values, &ctx).await
            }
        });

        let results = tokio::select! {
            _ = state.cancel.cancelled() => return Err(RunError::Cancelled),
            results = futures_util::future::join_all(tasks) => results,
        };

        let mut per_element: Vec<PortOutcomes> = Vec::with_capacity(results.len());
        let mut first_failure: Option<CapabilityError> = None;
        for result in results {
            match result {
                Ok(outcomes) => per_element.push(outcomes),
                Err(error) => {
                    if first_failure.is_none() {
                        state.emit(Event::node_error(
                            node.id.clone(),
                            state.round,
                            error.to_string(),
                        ));
                        first_failure = Some(error);
                    }
                }
            }
        }
        if let Some(source) = first_failure {
            return Err(RunError::NodeProcess {
                node: node.id.clone(),
                source,
            });
        }

        let merged = merge_element_outcomes(state, &node.id, &per_element);
        state.emit(Event::node_finish(node.id.clone(), state.round));
        state.settle(&node.id, merged)
    }
}

/// Merge per-element outcomes into array-typed outputs.
///
/// Alignment is positional: element `i` of every merged array comes from
/// invocation `i`. An element that excluded (or never recorded) a port keeps
/// its slot as a null placeholder; a port no element produced at all stays
/// excluded. An element that itself produced an array contributes a single
/// `any` element.
fn merge_element_outcomes(
    state: &RunState<'_>,
    node: &NodeId,
    per_element: &[PortOutcomes],
) -> PortOutcomes {
    let mut merged = PortOutcomes::default();
    for port in state.ports.output_ports(node) {
        let mut any_produced = false;
        let items: Vec<ScalarValue> = per_element
            .iter()
            .map(
                |outcomes| match outcomes.get(&port.id).and_then(PortOutcome::produced) {
                    Some(value) => {
                        any_produced = true;
                        value.clone().into_element()
                    }
                    None => ScalarValue::Any(serde_json::Value::Null),
                },
            )
            .collect();
        let outcome = if any_produced {
            PortOutcome::Produced(DataValue::Array(ArrayValue::from_scalars(items)))
        } else {
            PortOutcome::Excluded
        };
        merged.insert(port.id.clone(), outcome);
    }
    merged
}
