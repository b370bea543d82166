//! Run observability: lifecycle events, the fan-out bus, and sinks.
//!
//! Every observable fact about a run travels as an [`Event`] through an
//! [`EventBus`]: the scheduler emits lifecycle transitions, nodes stream
//! partial outputs, and any number of [`EventSink`]s consume the merged
//! stream (stdout, memory snapshots for tests, channels for live UIs).

pub mod bus;
pub mod event;
pub mod sink;

pub use bus::EventBus;
pub use event::{DiagnosticEvent, Event, NodeEvent, NodeEventKind, RunEvent, RunEventKind};
pub use sink::{ChannelSink, EventSink, MemorySink, StdOutSink};
