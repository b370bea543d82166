use std::io::{self, Result as IoResult, Stdout, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::event::Event;

/// Abstraction over an output target that consumes full [`Event`] objects.
pub trait EventSink: Send + Sync {
    /// Handle a structured event. The sink decides how to render it.
    fn handle(&mut self, event: &Event) -> IoResult<()>;
}

/// Line-per-event stdout sink.
pub struct StdOutSink {
    handle: Stdout,
}

impl Default for StdOutSink {
    fn default() -> Self {
        Self {
            handle: io::stdout(),
        }
    }
}

impl EventSink for StdOutSink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        writeln!(self.handle, "{event}")?;
        self.handle.flush()
    }
}

/// In-memory sink for testing and snapshots.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<Event>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all captured events, in arrival order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Event> {
        self.entries.lock().clone()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl EventSink for MemorySink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        self.entries.lock().push(event.clone());
        Ok(())
    }
}

/// Channel-based sink for streaming to async consumers.
///
/// Events are forwarded to a tokio mpsc channel without blocking. Useful for
/// live dashboards or SSE endpoints watching a run.
///
/// # Example
/// ```no_run
/// use tokio::sync::mpsc;
/// use portweave::event_bus::{ChannelSink, EventBus};
///
/// let (tx, mut rx) = mpsc::unbounded_channel();
/// let bus = EventBus::default();
/// bus.add_sink(ChannelSink::new(tx));
///
/// tokio::spawn(async move {
///     while let Some(event) = rx.recv().await {
///         println!("{event}");
///     }
/// });
/// ```
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelSink {
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel receiver dropped"))
    }
}
