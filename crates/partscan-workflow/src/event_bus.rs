use partscan_core::events::SystemEvent;
use tokio::sync::broadcast;

/// In-process pub/sub bus for workflow events.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<SystemEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event, returning how many subscribers received it.
    /// Publishing with no subscribers is not an error.
    pub fn publish(&self, event: SystemEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribes to all future events.
    ///
    /// NOTE: `tokio::sync::broadcast` drops older messages when a receiver
    /// lags behind capacity; slow consumers must handle `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
