use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

use crate::twin::{Twin, TwinDefinition};

/// Whether an ingested definition goes through registration first or starts
/// sharing immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    RegisterAndShare,
    ShareOnly,
}

/// Tagged transition driving the orchestrator's per-twin state machine.
/// Consumed exactly once per emission; a retry re-emission is a new instance.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// A definition left the ingestion stage.
    Loaded {
        definition: TwinDefinition,
        mode: IngestMode,
    },
    /// The twin needs (another) registration attempt with the remote
    /// directory. `attempt` paces the infinite retry.
    CreateRequested { twin: Arc<Twin>, attempt: u32 },
    /// Registration is done (or skipped); start the share loop.
    ShareRequested(Arc<Twin>),
}

impl LifecycleEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LifecycleEvent::Loaded { .. } => EventKind::Loaded,
            LifecycleEvent::CreateRequested { .. } => EventKind::CreateRequested,
            LifecycleEvent::ShareRequested(_) => EventKind::ShareRequested,
        }
    }
}

/// Routing key for subscriptions: one per [`LifecycleEvent`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Loaded,
    CreateRequested,
    ShareRequested,
}

/// In-process publish/subscribe bus decoupling the lifecycle stages.
///
/// Subscriptions are typed by [`EventKind`]: an event is only enqueued for
/// subscribers of its own kind, so a stage that publishes downstream events
/// never feeds its own queue. Each subscriber drains a bounded channel on
/// its own task; a slow handler backpressures only its own queue. Delivery
/// is FIFO per publisher/subscriber pair; there is no ordering across
/// subscribers or across concurrent publishers.
pub struct Dispatcher {
    subscribers: Mutex<Vec<(EventKind, mpsc::Sender<LifecycleEvent>)>>,
    capacity: usize,
    closed: AtomicBool,
}

impl Dispatcher {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Registers a subscriber for one event kind and returns its stream.
    pub fn subscribe(&self, kind: EventKind) -> mpsc::Receiver<LifecycleEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers.lock().push((kind, tx));
        rx
    }

    /// Delivers the event to every live subscriber of its kind. Sends run
    /// concurrently, so one full queue does not delay the others; the call
    /// resolves once every recipient has accepted (or gone away).
    pub async fn publish(&self, event: LifecycleEvent) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let kind = event.kind();
        let targets: Vec<_> = self
            .subscribers
            .lock()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, tx)| tx.clone())
            .collect();
        let sends = targets
            .iter()
            .map(|tx| tx.send(event.clone()))
            .collect::<Vec<_>>();
        let results = join_all(sends).await;
        if results.iter().any(|r| r.is_err()) {
            self.subscribers.lock().retain(|(_, tx)| !tx.is_closed());
        }
    }

    /// Drops every subscriber sender; stage loops drain and exit. Publishes
    /// after close are no-ops.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.subscribers.lock().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
