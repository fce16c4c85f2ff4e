//! Domain event system: decoupled observation of router runs.
//!
//! The router publishes an event whenever something interesting happens in
//! a run. Subscribers (CLI progress output, metrics, tests) react without the
//! loop knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A run was seeded and is about to query the model
    RunStarted {
        conversation_id: String,
        capabilities: usize,
        max_steps: u32,
        timestamp: DateTime<Utc>,
    },

    /// The model answered a step
    ModelResponded {
        conversation_id: String,
        step: u32,
        model: String,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// A capability was invoked
    CapabilityInvoked {
        conversation_id: String,
        step: u32,
        capability: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A run stopped
    RunFinished {
        conversation_id: String,
        steps: u32,
        /// Stop reason label ("done", "malformed_response", ...)
        reason: String,
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
