use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::NodeId;
use crate::value::PortValues;

/// Everything observable about a run flows through this one enum.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Event {
    Run(RunEvent),
    Node(NodeEvent),
    Diagnostic(DiagnosticEvent),
}

impl Event {
    pub fn run_started(run_id: impl Into<String>) -> Self {
        Event::Run(RunEvent::new(run_id, RunEventKind::Started))
    }

    pub fn run_finished(run_id: impl Into<String>) -> Self {
        Event::Run(RunEvent::new(run_id, RunEventKind::Finished))
    }

    pub fn node_start(node_id: NodeId, round: u64) -> Self {
        Event::Node(NodeEvent::new(node_id, round, NodeEventKind::Start))
    }

    pub fn node_finish(node_id: NodeId, round: u64) -> Self {
        Event::Node(NodeEvent::new(node_id, round, NodeEventKind::Finish))
    }

    pub fn node_error(node_id: NodeId, round: u64, message: impl Into<String>) -> Self {
        Event::Node(NodeEvent::new(
            node_id,
            round,
            NodeEventKind::Error {
                message: message.into(),
            },
        ))
    }

    pub fn node_excluded(node_id: NodeId, round: u64) -> Self {
        Event::Node(NodeEvent::new(node_id, round, NodeEventKind::Excluded))
    }

    pub fn partial_output(
        node_id: NodeId,
        round: u64,
        index: Option<usize>,
        values: PortValues,
    ) -> Self {
        Event::Node(NodeEvent::new(
            node_id,
            round,
            NodeEventKind::PartialOutput { index, values },
        ))
    }

    pub fn user_input_requested(node_id: NodeId, round: u64, questions: Vec<String>) -> Self {
        Event::Node(NodeEvent::new(
            node_id,
            round,
            NodeEventKind::UserInputRequested { questions },
        ))
    }

    pub fn diagnostic(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Diagnostic(DiagnosticEvent {
            scope: scope.into(),
            message: message.into(),
        })
    }

    /// The node this event concerns, if any.
    #[must_use]
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            Event::Node(node) => Some(&node.node_id),
            _ => None,
        }
    }

    /// Convert to a structured JSON value with a normalized schema.
    ///
    /// ```
    /// use portweave::event_bus::Event;
    ///
    /// let event = Event::node_start("fetch".into(), 2);
    /// let json = event.to_json_value();
    /// assert_eq!(json["type"], "node");
    /// assert_eq!(json["node_id"], "fetch");
    /// assert_eq!(json["round"], 2);
    /// ```
    #[must_use]
    pub fn to_json_value(&self) -> serde_json::Value {
        use serde_json::json;

        match self {
            Event::Run(run) => json!({
                "type": "run",
                "run_id": run.run_id,
                "kind": run.kind.label(),
                "timestamp": run.timestamp.to_rfc3339(),
            }),
            Event::Node(node) => json!({
                "type": "node",
                "node_id": node.node_id,
                "round": node.round,
                "kind": node.kind.label(),
                "detail": serde_json::to_value(&node.kind).unwrap_or(serde_json::Value::Null),
                "timestamp": node.timestamp.to_rfc3339(),
            }),
            Event::Diagnostic(diag) => json!({
                "type": "diagnostic",
                "scope": diag.scope,
                "message": diag.message,
            }),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Run(run) => write!(f, "[run {}] {}", run.run_id, run.kind.label()),
            Event::Node(node) => match &node.kind {
                NodeEventKind::Error { message } => {
                    write!(f, "[{}@{}] error: {message}", node.node_id, node.round)
                }
                kind => write!(f, "[{}@{}] {}", node.node_id, node.round, kind.label()),
            },
            Event::Diagnostic(diag) => write!(f, "[{}] {}", diag.scope, diag.message),
        }
    }
}

/// Run lifecycle marker.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RunEvent {
    pub run_id: String,
    pub kind: RunEventKind,
    pub timestamp: DateTime<Utc>,
}

impl RunEvent {
    pub fn new(run_id: impl Into<String>, kind: RunEventKind) -> Self {
        Self {
            run_id: run_id.into(),
            kind,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunEventKind {
    Started,
    Finished,
}

impl RunEventKind {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Finished => "finished",
        }
    }
}

/// One node lifecycle transition.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NodeEvent {
    pub node_id: NodeId,
    pub round: u64,
    pub kind: NodeEventKind,
    pub timestamp: DateTime<Utc>,
}

impl NodeEvent {
    pub fn new(node_id: NodeId, round: u64, kind: NodeEventKind) -> Self {
        Self {
            node_id,
            round,
            kind,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeEventKind {
    /// The node began processing.
    Start,
    /// The node settled with recorded outputs.
    Finish,
    /// The node failed; the run aborts at the round barrier.
    Error { message: String },
    /// Control flow excluded the node without invoking it.
    Excluded,
    /// Intermediate values streamed while still processing. `index` is the
    /// fan-out element index when emitted from inside an expansion.
    PartialOutput {
        index: Option<usize>,
        values: PortValues,
    },
    /// The node joined this round's batched user-input request.
    UserInputRequested { questions: Vec<String> },
}

impl NodeEventKind {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Finish => "finish",
            Self::Error { .. } => "error",
            Self::Excluded => "excluded",
            Self::PartialOutput { .. } => "partial_output",
            Self::UserInputRequested { .. } => "user_input_requested",
        }
    }
}

/// Free-form engine diagnostics (scheduler progress, sink trouble).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticEvent {
    pub scope: String,
    pub message: String,
}
