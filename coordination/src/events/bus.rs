//! Event bus for host coordination
//!
//! Provides pub/sub messaging using Tokio broadcast channels. Producers are
//! background tasks (the link read loop, training jobs); consumers are
//! whatever UI or supervisor tasks subscribe. Publishing never fails back
//! into the producer: a slow or crashed subscriber only ever loses its own
//! events.

use std::fmt;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Payload contract for events carried on an [`EventBus`].
pub trait BusEvent: Clone + fmt::Debug + Send + 'static {
    /// Stable snake_case name of the event variant, for logging and sinks.
    fn event_type(&self) -> &'static str;
}

/// Shared reference to an event bus
pub type SharedEventBus<E> = Arc<EventBus<E>>;

/// Event bus backed by a Tokio broadcast channel
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
}

impl<E: BusEvent> EventBus<E> {
    /// Create a new event bus with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    /// Create a new event bus with an explicit channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus<E> {
        Arc::new(self)
    }

    /// Publish an event to all subscribers.
    ///
    /// A bus with no subscribers accepts the event and drops it; producers
    /// must never stall or fail because nobody is listening.
    pub fn publish(&self, event: E) {
        let event_type = event.event_type();

        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "Event published"),
            Err(_) => debug!(event_type, "Event published (no receivers)"),
        }
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}
