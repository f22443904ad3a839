//! Domain event system: observe the relay without coupling to it.
//!
//! The dispatcher publishes an event for every inbound packet and every
//! outcome. Anything that wants counters or an audit trail subscribes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A text message passed the channel filter
    MessageReceived {
        channel: u32,
        sender_id: String,
        content_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// A text message arrived on a channel we don't answer on
    MessageFiltered {
        channel: u32,
        sender_id: String,
        timestamp: DateTime<Utc>,
    },

    /// An inbound packet could not be decoded
    EnvelopeRejected {
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The model failed to answer
    GenerationFailed {
        sender_id: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// A reply went out over the radio
    ReplySent {
        channel: u32,
        sender_id: String,
        frames_sent: usize,
        frames_failed: usize,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
