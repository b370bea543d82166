mod common;

use common::*;
use portweave::graph::{Graph, Node};
use portweave::scheduler::{RunError, Scheduler};
use portweave::types::NodeType;
use serde_json::json;

fn linear_graph() -> Graph {
    Graph::builder()
        .add_node(Node::new("src", NodeType::Text).with_data(json!({ "text": "hello" })))
        .add_node(Node::new("mid", NodeType::Code))
        .add_node(Node::new("out", NodeType::Match))
        .connect("src", "output", "mid", "input")
        .connect("mid", "output", "out", "input")
        .build()
        .unwrap()
}

#[tokio::test]
async fn linear_chain_runs_to_completion() {
    let scheduler = Scheduler::new(base_registry());
    let (result, events) = run_to_end(&scheduler, &linear_graph()).await;

    let output = result.unwrap();
    assert_eq!(output.outputs.len(), 1, "only the sink node is a run output");
    let record = output.outputs.get(&"out".into()).unwrap();
    assert!(!record.excluded);
    assert_eq!(produced_text(record, "value"), "hello");

    for node in ["src", "mid", "out"] {
        assert!(has_event_kind(&events, node, "start"), "{node} never started");
        assert!(has_event_kind(&events, node, "finish"), "{node} never finished");
    }
}

#[tokio::test]
async fn run_events_bracket_node_events() {
    let scheduler = Scheduler::new(base_registry());
    let (result, events) = run_to_end(&scheduler, &linear_graph()).await;
    result.unwrap();

    use portweave::event_bus::{Event, RunEventKind};
    assert!(matches!(
        events.first(),
        Some(Event::Run(run)) if run.kind == RunEventKind::Started
    ));
    assert!(matches!(
        events.last(),
        Some(Event::Run(run)) if run.kind == RunEventKind::Finished
    ));
}

#[tokio::test]
async fn independent_sinks_are_all_run_outputs() {
    let graph = Graph::builder()
        .add_node(Node::new("src", NodeType::Text).with_data(json!({ "text": "x" })))
        .add_node(Node::new("out_a", NodeType::Match))
        .add_node(Node::new("out_b", NodeType::Match))
        .connect("src", "output", "out_a", "input")
        .connect("src", "output", "out_b", "input")
        .build()
        .unwrap();

    let scheduler = Scheduler::new(base_registry());
    let (result, _) = run_to_end(&scheduler, &graph).await;

    let output = result.unwrap();
    assert_eq!(output.outputs.len(), 2);
    assert_eq!(produced_text(output.outputs.get(&"out_a".into()).unwrap(), "value"), "x");
    assert_eq!(produced_text(output.outputs.get(&"out_b".into()).unwrap(), "value"), "x");
}

#[tokio::test]
async fn partial_outputs_reach_the_bus_before_the_node_finishes() {
    let registry = base_registry().register(NodeType::ExtractRegex, Streaming);
    let graph = Graph::builder()
        .add_node(Node::new("src", NodeType::Text).with_data(json!({ "text": "chunk" })))
        .add_node(Node::new("stream", NodeType::ExtractRegex))
        .connect("src", "output", "stream", "input")
        .build()
        .unwrap();

    let scheduler = Scheduler::new(registry);
    let (result, events) = run_to_end(&scheduler, &graph).await;
    result.unwrap();

    use portweave::event_bus::NodeEventKind;
    let stream_events = node_events(&events, "stream");
    let partial_at = stream_events
        .iter()
        .position(|ne| matches!(ne.kind, NodeEventKind::PartialOutput { index: None, .. }))
        .unwrap();
    let finish_at = stream_events
        .iter()
        .position(|ne| ne.kind.label() == "finish")
        .unwrap();
    assert!(partial_at < finish_at);
}

#[tokio::test]
async fn unregistered_node_type_fails_the_run() {
    let graph = Graph::builder()
        .add_node(Node::new("lonely", NodeType::Chat))
        .build()
        .unwrap();

    let scheduler = Scheduler::new(base_registry());
    let (result, _) = run_to_end(&scheduler, &graph).await;
    assert!(matches!(result, Err(RunError::Unregistered(_))));
}

#[tokio::test]
async fn missing_required_input_surfaces_as_node_failure() {
    // `mid` requires an input but nothing feeds it; readiness treats the
    // unconnected port as satisfied, so the capability itself rejects it.
    let graph = Graph::builder()
        .add_node(Node::new("mid", NodeType::Code))
        .build()
        .unwrap();

    let scheduler = Scheduler::new(base_registry());
    let (result, events) = run_to_end(&scheduler, &graph).await;

    assert!(matches!(
        result,
        Err(RunError::NodeProcess { ref node, .. }) if node.as_str() == "mid"
    ));
    assert_eq!(error_count(&events, "mid"), 1);
}
