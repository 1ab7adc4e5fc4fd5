//! Inbound ticket events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{DefaultHasher, Hash, Hasher};

/// An inbound ticket event as received from the ticketing system.
///
/// Events are immutable after receipt. Identity is `event_id` when the
/// source provides one, otherwise a coarse hash of `ticket_id` plus the
/// raw payload, good enough to key the dedupe window and nothing more.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Source-assigned event identifier, if any.
    pub event_id: Option<String>,
    /// Ticket this event refers to.
    pub ticket_id: String,
    /// When the event was received by the gate.
    pub received_at: DateTime<Utc>,
    /// Raw payload as delivered by the source.
    pub raw_payload: serde_json::Value,
}

impl InboundEvent {
    /// Create an event received now.
    #[must_use]
    pub fn new(ticket_id: impl Into<String>, raw_payload: serde_json::Value) -> Self {
        Self {
            event_id: None,
            ticket_id: ticket_id.into(),
            received_at: Utc::now(),
            raw_payload,
        }
    }

    /// Set the source-assigned event id.
    #[must_use]
    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    /// Dedupe key for this event.
    ///
    /// Prefers the source-assigned `event_id`; falls back to a hash of
    /// `ticket_id` + payload when the source omits one.
    #[must_use]
    pub fn dedupe_key(&self) -> DedupeKey {
        let mut hasher = DefaultHasher::new();
        self.ticket_id.hash(&mut hasher);
        match &self.event_id {
            Some(id) => id.hash(&mut hasher),
            None => self.raw_payload.to_string().hash(&mut hasher),
        }
        DedupeKey {
            ticket_id: self.ticket_id.clone(),
            payload_hash: hasher.finish(),
        }
    }
}

/// Identity of an event within the dedupe window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupeKey {
    /// Ticket the event refers to.
    pub ticket_id: String,
    /// Coarse hash of the event identity.
    pub payload_hash: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn same_payload_same_key() {
        let a = InboundEvent::new("42", json!({"event": "ticket_created"}));
        let b = InboundEvent::new("42", json!({"event": "ticket_created"}));
        assert_eq!(a.dedupe_key(), b.dedupe_key());
    }

    #[test]
    fn different_ticket_different_key() {
        let a = InboundEvent::new("42", json!({"event": "ticket_created"}));
        let b = InboundEvent::new("43", json!({"event": "ticket_created"}));
        assert_ne!(a.dedupe_key(), b.dedupe_key());
    }

    #[test]
    fn event_id_takes_precedence_over_payload() {
        let a = InboundEvent::new("42", json!({"n": 1})).with_event_id("evt_1");
        let b = InboundEvent::new("42", json!({"n": 2})).with_event_id("evt_1");
        assert_eq!(a.dedupe_key(), b.dedupe_key());
    }
}
