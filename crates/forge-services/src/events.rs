//! # Domain Events
//!
//! A broadcast channel the services publish to after a transaction commits.
//! The bus is an explicit handle passed in at construction; nothing global.
//!
//! ## Flow
//! ```text
//! service mutation ──commit──► EventBus::publish ──► every subscriber
//! ```
//!
//! Publishing never fails and never blocks: with no live subscribers the
//! event is simply dropped, and slow subscribers lag rather than stall
//! the publisher (`tokio::sync::broadcast` semantics).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use forge_core::AuditAction;

/// Default channel capacity before slow subscribers start lagging.
const DEFAULT_CAPACITY: usize = 256;

/// Something that changed, published after the mutation committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Entity type name ("Asset", "User", "Session").
    pub entity_type: String,

    /// Id of the entity the mutation touched.
    pub entity_id: String,

    /// What happened, in the audit vocabulary.
    pub action: AuditAction,

    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(entity_type: &str, entity_id: &str, action: AuditAction) -> Self {
        DomainEvent {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            action,
            occurred_at: Utc::now(),
        }
    }
}

/// Publisher handle over the broadcast channel.
///
/// Cheap to clone; every clone publishes into the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        EventBus { sender }
    }

    /// A fresh receiver. Only events published after this call are seen.
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event. An error from the channel means there are no
    /// live receivers, which is a normal state, not a failure.
    pub fn publish(&self, event: DomainEvent) {
        let _ = self.sender.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new(DEFAULT_CAPACITY)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
