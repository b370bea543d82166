use std::sync::Arc;

use parking_lot::Mutex;
use tokio::{sync::oneshot, task};

use super::event::Event;
use super::sink::{EventSink, StdOutSink};

/// Receives events from producers and broadcasts each one to every sink.
///
/// Producers hold a cheap [`flume::Sender`] clone (see
/// [`get_sender`](EventBus::get_sender)); a single background task drains the
/// channel and fans out. Sink failures are reported on stderr and do not
/// stop the listener.
pub struct EventBus {
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
    event_channel: (flume::Sender<Event>, flume::Receiver<Event>),
    listener: Mutex<Option<ListenerState>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_sink(StdOutSink::default())
    }
}

impl EventBus {
    /// Create an `EventBus` with a single sink.
    pub fn with_sink<T>(sink: T) -> Self
    where
        T: EventSink + 'static,
    {
        Self {
            sinks: Arc::new(Mutex::new(vec![Box::new(sink)])),
            event_channel: flume::unbounded(),
            listener: Mutex::new(None),
        }
    }

    /// Create an `EventBus` with multiple sinks.
    #[must_use]
    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self {
            sinks: Arc::new(Mutex::new(sinks)),
            event_channel: flume::unbounded(),
            listener: Mutex::new(None),
        }
    }

    /// Dynamically add a sink (useful for per-run streaming).
    pub fn add_sink<T: EventSink + 'static>(&self, sink: T) {
        self.sinks.lock().push(Box::new(sink));
    }

    /// Clone of the sender side so producers can emit events.
    #[must_use]
    pub fn get_sender(&self) -> flume::Sender<Event> {
        self.event_channel.0.clone()
    }

    /// Spawn the background task that drains events into the sinks.
    /// Idempotent: calling multiple times has no effect.
    pub fn listen_for_events(&self) {
        let mut guard = self.listener.lock();
        if guard.is_some() {
            return;
        }

        let receiver = self.event_channel.1.clone();
        let sinks = self.sinks.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = task::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    recv = receiver.recv_async() => match recv {
                        Err(_) => break,
                        Ok(event) => {
                            let mut sinks_guard = sinks.lock();
                            for sink in sinks_guard.iter_mut() {
                                if let Err(e) = sink.handle(&event) {
                                    eprintln!("event sink error: {e}");
                                }
                            }
                        }
                    }
                }
            }
        });

        *guard = Some(ListenerState {
            shutdown_tx,
            handle,
        });
    }

    /// Stop the background listener, draining nothing further.
    pub async fn stop_listener(&self) {
        let state = self.listener.lock().take();
        if let Some(state) = state {
            let _ = state.shutdown_tx.send(());
            let _ = state.handle.await;
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if let Some(state) = self.listener.lock().take() {
            let _ = state.shutdown_tx.send(());
            state.handle.abort();
        }
    }
}

struct ListenerState {
    shutdown_tx: oneshot::Sender<()>,
    handle: task::JoinHandle<()>,
}
