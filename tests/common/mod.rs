#![allow(dead_code)]

pub mod capabilities;
pub mod sources;

pub use capabilities::*;
pub use sources::*;

use portweave::context::{CancelSignal, ProcessContext};
use portweave::event_bus::{Event, EventBus, MemorySink, NodeEvent, NodeEventKind};
use portweave::graph::Graph;
use portweave::scheduler::{RunError, RunOutput, Scheduler};
use portweave::store::NodeRecord;
use portweave::value::{DataValue, ScalarValue};
use tokio::time::{sleep, Duration};

/// Run a graph with a memory sink and return the result together with every
/// event captured during the run.
pub async fn run_to_end(
    scheduler: &Scheduler,
    graph: &Graph,
) -> (Result<RunOutput, RunError>, Vec<Event>) {
    let sink = MemorySink::new();
    let bus = EventBus::with_sink(sink.clone());
    let result = scheduler
        .run(graph, ProcessContext::new(), &bus, CancelSignal::never())
        .await;
    drain_events(&bus).await;
    (result, sink.snapshot())
}

/// Wait for the bus listener to catch up with everything emitted so far.
pub async fn drain_events(bus: &EventBus) {
    let sender = bus.get_sender();
    for _ in 0..200 {
        if sender.is_empty() {
            break;
        }
        sleep(Duration::from_millis(5)).await;
    }
    // One more tick for the sink to handle the final event.
    sleep(Duration::from_millis(10)).await;
}

/// Node lifecycle events for one node, in emission order.
pub fn node_events<'a>(events: &'a [Event], node: &str) -> Vec<&'a NodeEvent> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Node(ne) if ne.node_id.as_str() == node => Some(ne),
            _ => None,
        })
        .collect()
}

pub fn has_event_kind(events: &[Event], node: &str, label: &str) -> bool {
    node_events(events, node)
        .iter()
        .any(|ne| ne.kind.label() == label)
}

pub fn error_count(events: &[Event], node: &str) -> usize {
    node_events(events, node)
        .iter()
        .filter(|ne| matches!(ne.kind, NodeEventKind::Error { .. }))
        .count()
}

/// Extract the produced text scalar recorded on `port`.
pub fn produced_text(record: &NodeRecord, port: &str) -> String {
    match record
        .outcomes
        .get(&port.into())
        .and_then(|o| o.produced())
    {
        Some(DataValue::Scalar(ScalarValue::Text(text))) => text.clone(),
        other => panic!("expected text on port {port}, got {other:?}"),
    }
}

/// Extract the produced text array recorded on `port`, in element order.
pub fn produced_texts(record: &NodeRecord, port: &str) -> Vec<String> {
    match record
        .outcomes
        .get(&port.into())
        .and_then(|o| o.produced())
    {
        Some(DataValue::Array(array)) => array
            .items()
            .iter()
            .map(|item| match item {
                ScalarValue::Text(text) => text.clone(),
                other => panic!("expected text element, got {other:?}"),
            })
            .collect(),
        other => panic!("expected text array on port {port}, got {other:?}"),
    }
}
