//! Domain event system: decoupled communication between bounded contexts.
//!
//! Events are published when something interesting happens in the engine.
//! Other components can subscribe to react without tight coupling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A user turn began
    TurnStarted {
        conversation_id: String,
        turn: u64,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The router skipped a failing model and moved on
    ModelFallback {
        purpose: String,
        from_model: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The loop stopped to wait for confirmation
    TurnSuspended {
        conversation_id: String,
        pending_calls: usize,
        timestamp: DateTime<Utc>,
    },

    /// The loop produced a final reply
    TurnCompleted {
        conversation_id: String,
        iterations: usize,
        synthesized: bool,
        timestamp: DateTime<Utc>,
    },

    /// Older messages were folded into a summary
    ConversationCompacted {
        conversation_id: String,
        replaced: usize,
        timestamp: DateTime<Utc>,
    },

    /// A source finished indexing
    KnowledgeIndexed {
        source: String,
        records: usize,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
/// Components can subscribe to receive all events and filter for what they care about.
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::ToolExecuted {
            tool_name: "search_knowledge".into(),
            success: true,
            duration_ms: 42,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ToolExecuted { tool_name, success, .. } => {
                assert_eq!(tool_name, "search_knowledge");
                assert!(success);
            }
            _ => panic!("Expected ToolExecuted event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::KnowledgeIndexed {
            source: "resume".into(),
            records: 0,
            timestamp: Utc::now(),
        });
    }
}
