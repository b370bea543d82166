//! Execution contexts and cancellation.
//!
//! [`ProcessContext`] carries run-wide settings (model endpoints, feature
//! toggles, whatever the embedding application wants nodes to see). It is
//! injected at run start and never mutated; nodes read it through their
//! [`NodeContext`].
//!
//! [`NodeContext`] is handed to every capability invocation. Besides
//! identifying the invocation (node id, round, split element index) it is
//! the node's only channel back to the outside world while running: partial
//! output streaming goes through [`NodeContext::emit_partial`], and
//! long-running nodes can poll [`CancelSignal`] to stop early.
//!
//! Cancellation is cooperative. The holder of a [`CancelHandle`] flips a
//! watch channel; the scheduler races the signal against every suspension
//! point and nodes may additionally observe it mid-flight.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

use crate::event_bus::Event;
use crate::types::NodeId;
use crate::value::PortValues;

/// Immutable, run-wide settings visible to every node.
///
/// # Examples
///
/// ```rust
/// use portweave::context::ProcessContext;
/// use serde_json::json;
///
/// let ctx = ProcessContext::new()
///     .with_setting("model", json!("small-fast"))
///     .with_setting("temperature", json!(0.2));
/// assert_eq!(ctx.get_str("model"), Some("small-fast"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct ProcessContext {
    settings: FxHashMap<String, serde_json::Value>,
}

impl ProcessContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.settings.get(key)
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(|v| v.as_str())
    }
}

/// Errors a node can hit talking to its context.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeContextError {
    #[error("event channel closed while emitting from node {node_id}")]
    #[diagnostic(
        code(portweave::context::event_channel_closed),
        help("the event bus listener stopped; this usually means the run was torn down")
    )]
    EventChannelClosed { node_id: NodeId },
}

/// Per-invocation handle passed to every capability call.
#[derive(Clone, Debug)]
pub struct NodeContext {
    pub node_id: NodeId,
    /// Scheduler round this invocation belongs to.
    pub round: u64,
    /// Element index when the node runs as part of a fan-out expansion.
    pub index: Option<usize>,
    pub process: Arc<ProcessContext>,
    pub cancel: CancelSignal,
    event_sender: flume::Sender<Event>,
}

impl NodeContext {
    pub fn new(
        node_id: NodeId,
        round: u64,
        index: Option<usize>,
        process: Arc<ProcessContext>,
        cancel: CancelSignal,
        event_sender: flume::Sender<Event>,
    ) -> Self {
        Self {
            node_id,
            round,
            index,
            process,
            cancel,
            event_sender,
        }
    }

    /// Emit an event on the run's bus.
    pub fn emit(&self, event: Event) -> Result<(), NodeContextError> {
        self.event_sender
            .send(event)
            .map_err(|_| NodeContextError::EventChannelClosed {
                node_id: self.node_id.clone(),
            })
    }

    /// Stream intermediate output values while still processing.
    ///
    /// Observers see a `partial_output` event tagged with this invocation's
    /// split element index, if any.
    pub fn emit_partial(&self, values: PortValues) -> Result<(), NodeContextError> {
        self.emit(Event::partial_output(
            self.node_id.clone(),
            self.round,
            self.index,
            values,
        ))
    }
}

/// Trigger side of run cancellation.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Create a linked handle/signal pair.
    #[must_use]
    pub fn new() -> (Self, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (
            Self { tx },
            CancelSignal {
                rx,
                _keepalive: None,
            },
        )
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Observer side of run cancellation. Cheap to clone.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
    // Present only for `never()` signals, which own their sender so the
    // channel never reports closed.
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl CancelSignal {
    /// A signal that never fires, for runs without external cancellation.
    #[must_use]
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested.
    ///
    /// If the handle is dropped without cancelling, this future stays
    /// pending, which is exactly what a `select!` arm wants.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
