//! The round-based scheduler: the engine's execution core.
//!
//! A run advances in rounds. Each round the scheduler computes the ready
//! frontier from the pending set, partitions it into user-input nodes,
//! fan-out nodes, and ordinary nodes, and dispatches each group:
//!
//! 1. user-input nodes join one batched external request,
//! 2. fan-out nodes expand over their array input, running their fragment
//!    once per element,
//! 3. ordinary nodes run concurrently under the configured concurrency cap.
//!
//! Every dispatched node settles before the next round starts. Settlement
//! (writing the result store and visited set) happens only on the
//! scheduler's own control flow at the round barrier, never inside node
//! tasks, so rounds are also consistency barriers.
//!
//! An empty frontier with work still pending means the graph cannot make
//! progress (a dependency cycle, typically) and fails the run. A failing
//! node lets the rest of its round settle, then fails the run with the
//! first error; there is no best-effort continuation into later rounds.
//!
//! # Example
//!
//! ```no_run
//! use portweave::capability::CapabilityRegistry;
//! use portweave::context::{CancelSignal, ProcessContext};
//! use portweave::event_bus::{EventBus, MemorySink};
//! use portweave::graph::{Graph, Node};
//! use portweave::scheduler::Scheduler;
//! use portweave::types::NodeType;
//!
//! # async fn demo(registry: CapabilityRegistry, graph: Graph) -> miette::Result<()> {
//! let scheduler = Scheduler::new(registry).with_concurrency(4);
//! let bus = EventBus::with_sink(MemorySink::new());
//! let output = scheduler
//!     .run(&graph, ProcessContext::new(), &bus, CancelSignal::never())
//!     .await?;
//! println!("run {} produced {} output node(s)", output.run_id, output.outputs.len());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::instrument;

use crate::capability::{CapabilityError, CapabilityRegistry, NodeCapability, PortCache, UnregisteredType};
use crate::context::{CancelSignal, NodeContext, ProcessContext};
use crate::event_bus::{Event, EventBus};
use crate::graph::{Graph, Node};
use crate::pruner::ControlFlowPruner;
use crate::readiness::ReadinessEvaluator;
use crate::store::{NodeRecord, ResultStore, StoreError, VisitedSet};
use crate::types::NodeId;
use crate::user_input::{UserInputError, UserInputSource};
use crate::value::{values_from_outcomes, PortOutcomes, ScalarValue};

/// Default cap on concurrently processing nodes within one round.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Terminal failure of a run.
#[derive(Debug, Error, Diagnostic)]
pub enum RunError {
    #[error("no runnable nodes remain; {} node(s) stalled on unsatisfied dependencies", pending.len())]
    #[diagnostic(
        code(portweave::scheduler::dependency),
        help("check the graph for dependency cycles among the stalled nodes")
    )]
    Dependency { pending: Vec<NodeId> },

    #[error("fan-out node {node} has no elements to expand over")]
    #[diagnostic(
        code(portweave::scheduler::empty_split_input),
        help("the array input was empty (or missing) after applying the fan-out cap")
    )]
    EmptySplitInput { node: NodeId },

    #[error("node {node} failed while processing")]
    #[diagnostic(code(portweave::scheduler::node_process))]
    NodeProcess {
        node: NodeId,
        #[source]
        #[diagnostic_source]
        source: CapabilityError,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    UserInput(#[from] UserInputError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Unregistered(#[from] UnregisteredType),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error("run cancelled")]
    #[diagnostic(code(portweave::scheduler::cancelled))]
    Cancelled,
}

/// Result of a completed run.
#[derive(Debug)]
pub struct RunOutput {
    pub run_id: String,
    /// Record of every graph-output node (nodes declaring zero output
    /// ports). An excluded output node keeps its record, flagged excluded,
    /// rather than being dropped.
    pub outputs: FxHashMap<NodeId, NodeRecord>,
}

/// Executes graphs against an explicit capability registry.
///
/// One `Scheduler` is reusable across runs and carries no per-run state.
pub struct Scheduler {
    pub(crate) registry: CapabilityRegistry,
    pub(crate) user_input: Option<Arc<dyn UserInputSource>>,
    pub(crate) concurrency: usize,
}

impl Scheduler {
    #[must_use]
    pub fn new(registry: CapabilityRegistry) -> Self {
        Self {
            registry,
            user_input: None,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Attach the external provider for interactive nodes.
    #[must_use]
    pub fn with_user_input_source(mut self, source: impl UserInputSource + 'static) -> Self {
        self.user_input = Some(Arc::new(source));
        self
    }

    /// Cap the number of nodes processing concurrently within one round.
    #[must_use]
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }

    pub(crate) fn capability_for(&self, node: &Node) -> Result<Arc<dyn NodeCapability>, RunError> {
        self.registry
            .get(node.node_type)
            .ok_or_else(|| UnregisteredType(node.node_type).into())
    }

    /// Execute `graph` to completion.
    ///
    /// Emits lifecycle events on `bus` throughout. `cancel` is observed
    /// between rounds and raced against every suspension point; use
    /// [`CancelSignal::never`] for uncancellable runs.
    #[instrument(skip_all, fields(run_id = tracing::field::Empty))]
    pub async fn run(
        &self,
        graph: &Graph,
        process: ProcessContext,
        bus: &EventBus,
        cancel: CancelSignal,
    ) -> Result<RunOutput, RunError> {
        let ports = PortCache::build(graph, &self.registry)?;
        let run_id = uuid::Uuid::new_v4().to_string();
        tracing::Span::current().record("run_id", run_id.as_str());

        bus.listen_for_events();
        let mut state = RunState {
            graph,
            ports,
            store: ResultStore::new(),
            visited: VisitedSet::new(),
            pending: graph.nodes().iter().map(|n| n.id.clone()).collect(),
            round: 0,
            process: Arc::new(process),
            cancel,
            events: bus.get_sender(),
        };
        state.emit(Event::run_started(run_id.clone()));

        while !state.pending.is_empty() {
            if state.cancel.is_cancelled() {
                return Err(RunError::Cancelled);
            }
            state.round += 1;

            let evaluator = ReadinessEvaluator::new(graph, &state.ports);
            let ready: Vec<&Node> = graph
                .nodes()
                .iter()
                .filter(|node| state.pending.contains(&node.id))
                .filter(|node| {
                    evaluator.is_ready(&node.id, &state.visited)
                        && evaluator.can_run_directly(&node.id, &state.visited)
                })
                .collect();

            if ready.is_empty() {
                let mut pending: Vec<NodeId> = state.pending.iter().cloned().collect();
                pending.sort();
                for node in &pending {
                    state.emit(Event::node_error(
                        node.clone(),
                        state.round,
                        "unsatisfied dependencies",
                    ));
                }
                return Err(RunError::Dependency { pending });
            }

            let mut user_inputs = Vec::new();
            let mut splits = Vec::new();
            let mut normals = Vec::new();
            for node in ready {
                if node.node_type.is_user_input() {
                    user_inputs.push(node);
                } else if node.node_type.is_split_run() {
                    splits.push(node);
                } else {
                    normals.push(node);
                }
            }
            tracing::debug!(
                round = state.round,
                interactive = user_inputs.len(),
                fan_out = splits.len(),
                ordinary = normals.len(),
                "dispatching round"
            );

            self.run_user_input_batch(&mut state, user_inputs).await?;
            for split in splits {
                self.expand_split(&mut state, split, &mut normals).await?;
            }
            self.run_ordinary(&mut state, normals).await?;
        }

        let output_nodes: Vec<&NodeId> = graph
            .nodes()
            .iter()
            .filter(|node| state.ports.is_graph_output(&node.id))
            .map(|node| &node.id)
            .collect();
        let outputs = state.store.take_records_for(output_nodes);
        state.emit(Event::run_finished(run_id.clone()));
        tracing::info!(rounds = state.round, outputs = outputs.len(), "run finished");

        Ok(RunOutput { run_id, outputs })
    }

    /// Dispatch one round's ordinary nodes concurrently and settle them at
    /// the barrier.
    async fn run_ordinary<'g>(
        &self,
        state: &mut RunState<'g>,
        nodes: Vec<&'g Node>,
    ) -> Result<(), RunError> {
        let mut dispatched = Vec::new();
        for node in nodes {
            let gathered = state.gather(&node.id);
            let pruner = ControlFlowPruner::new(state.graph, &state.ports);
            if pruner.is_excluded(&node.id, &gathered, &state.store) {
                let outcomes = pruner.exclusion_outcomes(&node.id);
                state.emit(Event::node_excluded(node.id.clone(), state.round));
                state.settle_excluded(&node.id, outcomes)?;
                continue;
            }

            let capability = self.capability_for(node)?;
            let values = values_from_outcomes(&gathered);
            let ctx = state.node_ctx(&node.id, None);
            dispatched.push((node, capability, values, ctx));
        }

        if dispatched.is_empty() {
            return Ok(());
        }

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let tasks = dispatched.into_iter().map(|(node, capability, values, ctx)| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let _ = ctx.emit(Event::node_start(node.id.clone(), ctx.round));
                let result = capability.process(node, &values, &ctx).await;
                (node, result)
            }
        });

        let results = tokio::select! {
            _ = state.cancel.cancelled() => return Err(RunError::Cancelled),
            results = futures_util::future::join_all(tasks) => results,
        };

        let mut first_failure: Option<(NodeId, CapabilityError)> = None;
        for (node, result) in results {
            match result {
                Ok(outcomes) => {
                    state.emit(Event::node_finish(node.id.clone(), state.round));
                    state.settle(&node.id, outcomes)?;
                }
                Err(error) => {
                    state.emit(Event::node_error(
                        node.id.clone(),
                        state.round,
                        error.to_string(),
                    ));
                    if first_failure.is_none() {
                        first_failure = Some((node.id.clone(), error));
                    }
                }
            }
        }

        match first_failure {
            Some((node, source)) => Err(RunError::NodeProcess { node, source }),
            None => Ok(()),
        }
    }
}

/// Mutable bookkeeping for one run, owned by the scheduler's control flow.
pub(crate) struct RunState<'g> {
    pub(crate) graph: &'g Graph,
    pub(crate) ports: PortCache,
    pub(crate) store: ResultStore,
    pub(crate) visited: VisitedSet,
    pub(crate) pending: FxHashSet<NodeId>,
    pub(crate) round: u64,
    pub(crate) process: Arc<ProcessContext>,
    pub(crate) cancel: CancelSignal,
    pub(crate) events: flume::Sender<Event>,
}

impl RunState<'_> {
    pub(crate) fn emit(&self, event: Event) {
        if self.events.send(event).is_err() {
            tracing::warn!("event channel closed; dropping event");
        }
    }

    /// Gather the recorded outcomes feeding each of `node`'s input ports.
    ///
    /// Ports with no connection, or whose source never recorded the
    /// connected output port, are simply absent.
    pub(crate) fn gather(&self, node: &NodeId) -> PortOutcomes {
        let mut gathered = PortOutcomes::default();
        for port in self.ports.input_ports(node) {
            if let Some(connection) = self.graph.index().connection_into(node, &port.id) {
                if let Some(outcome) = self
                    .store
                    .outcome(&connection.from_node, &connection.from_port)
                {
                    gathered.insert(port.id.clone(), outcome.clone());
                }
            }
        }
        gathered
    }

    pub(crate) fn settle(&mut self, node: &NodeId, outcomes: PortOutcomes) -> Result<(), RunError> {
        self.store.record(node.clone(), outcomes)?;
        self.visited.mark(node.clone());
        self.pending.remove(node);
        Ok(())
    }

    pub(crate) fn settle_excluded(
        &mut self,
        node: &NodeId,
        outcomes: PortOutcomes,
    ) -> Result<(), RunError> {
        self.store.record_excluded(node.clone(), outcomes)?;
        self.visited.mark(node.clone());
        self.pending.remove(node);
        Ok(())
    }

    pub(crate) fn node_ctx(&self, node: &NodeId, index: Option<usize>) -> NodeContext {
        NodeContext::new(
            node.clone(),
            self.round,
            index,
            self.process.clone(),
            self.cancel.clone(),
            self.events.clone(),
        )
    }

    /// Flatten a node's text inputs to question strings, in input-port
    /// order. Text arrays contribute one question per element.
    pub(crate) fn questions_for(
        &self,
        node: &NodeId,
        values: &crate::value::PortValues,
    ) -> Vec<String> {
        let mut questions = Vec::new();
        for port in self.ports.input_ports(node) {
            match values.get(&port.id) {
                Some(crate::value::DataValue::Scalar(ScalarValue::Text(text))) => {
                    questions.push(text.clone());
                }
                Some(crate::value::DataValue::Array(array)) => {
                    for item in array.items() {
                        if let ScalarValue::Text(text) = item {
                            questions.push(text.clone());
                        }
                    }
                }
                _ => {}
            }
        }
        questions
    }
}
