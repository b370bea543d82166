//! # Portweave: Round-based Graph Execution Engine
//!
//! Portweave executes typed, port-connected node graphs: nodes declare input
//! and output ports, connections carry values between them, and a scheduler
//! advances the graph in rounds until every node has settled.
//!
//! ## Core Concepts
//!
//! - **Graph**: immutable nodes + connections, validated at construction
//! - **Capability**: per-node-type behavior, registered explicitly
//! - **Scheduler**: round-based frontier dispatch with a concurrency cap
//! - **Port outcomes**: every port settles as `Produced(value)` or
//!   `Excluded` (branch not taken), and exclusion propagates without
//!   executing the pruned nodes
//! - **Fan-out**: `SplitRun` nodes run their downstream fragment once per
//!   array element and merge the results back into arrays
//! - **User input**: interactive nodes suspend the run on one batched
//!   external request per round
//!
//! ## Quick Start
//!
//! ```no_run
//! use portweave::capability::CapabilityRegistry;
//! use portweave::context::{CancelSignal, ProcessContext};
//! use portweave::event_bus::{EventBus, MemorySink};
//! use portweave::graph::{Graph, Node};
//! use portweave::scheduler::Scheduler;
//! use portweave::types::NodeType;
//!
//! # async fn demo(registry: CapabilityRegistry) -> miette::Result<()> {
//! let graph = Graph::builder()
//!     .add_node(Node::new("source", NodeType::Text))
//!     .add_node(Node::new("sink", NodeType::Code))
//!     .connect("source", "output", "sink", "input")
//!     .build()?;
//!
//! let scheduler = Scheduler::new(registry);
//! let bus = EventBus::with_sink(MemorySink::new());
//! let output = scheduler
//!     .run(&graph, ProcessContext::new(), &bus, CancelSignal::never())
//!     .await?;
//!
//! for (node, outcomes) in &output.outputs {
//!     println!("{node}: {outcomes:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`types`] - node and port identifiers, the closed node-type set
//! - [`value`] - scalar/array values and per-port outcomes
//! - [`graph`] - nodes, connections, validation, the connection index
//! - [`capability`] - the behavior trait, registry, and port cache
//! - [`context`] - run settings, per-invocation context, cancellation
//! - [`store`] - write-once result store and visited set
//! - [`readiness`] - frontier rules, including the cycle break
//! - [`pruner`] - control-flow exclusion propagation
//! - [`split`] - fan-out expansion
//! - [`user_input`] - the batched human-input round trip
//! - [`scheduler`] - the round loop itself
//! - [`event_bus`] - lifecycle events, the bus, and sinks
//! - [`telemetry`] - tracing subscriber setup

pub mod capability;
pub mod context;
pub mod event_bus;
pub mod graph;
pub mod pruner;
pub mod readiness;
pub mod scheduler;
pub mod split;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod user_input;
pub mod value;
