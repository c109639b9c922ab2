//! Event bus for player change notifications
//!
//! Uses tokio::sync::broadcast for pub/sub pattern.
//! The mpv reader task publishes, the notification translator (and tests) subscribe.

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::player::PropertyValue;

/// A change reported by the player, in the order the player emitted it
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// An observed property changed value
    Property { name: String, value: PropertyValue },
    /// A seek completed; positions in seconds
    Seek { start: Option<f64>, end: f64 },
}

impl ChangeEvent {
    pub fn property(name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self::Property {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Property name this event is about (`"seek"` for seeks)
    pub fn name(&self) -> &str {
        match self {
            Self::Property { name, .. } => name,
            Self::Seek { .. } => "seek",
        }
    }
}

/// Event bus handle for publishing and subscribing
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ChangeEvent>,
}

impl EventBus {
    /// Create a new event bus with specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: ChangeEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    /// Default capacity (256 events)
    fn default() -> Self {
        Self::new(256)
    }
}

/// Shared event bus wrapped in Arc for thread-safe sharing
pub type SharedBus = Arc<EventBus>;

/// Create a new shared event bus
pub fn create_bus() -> SharedBus {
    Arc::new(EventBus::default())
}
