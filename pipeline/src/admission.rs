//! Admission gate for inbound ticket events.
//!
//! Every event passes three checks before it may start a pipeline run:
//!
//! 1. **Relevance** - only refund-related tickets proceed; everything
//!    else is ignored without side effects.
//! 2. **Deduplication** - redelivered events inside the dedupe window
//!    are dropped. The store is fail-open: if it errors, the event is
//!    admitted rather than lost.
//! 3. **Rate limiting** - a token bucket per event source caps the rate
//!    at which runs may start.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use refund_triage_core::event::{DedupeKey, InboundEvent};
use refund_triage_core::PolicyConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Keywords that mark a ticket as refund-related.
///
/// Matched case-insensitively against the event payload text. A ticket
/// that mentions none of these never enters the pipeline.
const REFUND_KEYWORDS: &[&str] = &[
    "refund",
    "refunds",
    "reimbursement",
    "reimburse",
    "money back",
    "cancel",
    "cancellation",
    "cancelled",
    "canceled",
    "chargeback",
    "charge back",
    "dispute",
];

/// Outcome of the admission checks for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Event passed all checks and may start a run.
    Accept,
    /// Event was already seen inside the dedupe window.
    Duplicate,
    /// The source exceeded its rate budget.
    RateLimited,
    /// Event is not refund-related; no run is started.
    Ignored,
}

/// Deduplication store keyed on event identity.
///
/// Implementations may be backed by memory, Redis, or a database; the
/// gate only needs atomic check-and-insert semantics.
#[async_trait]
pub trait DedupeStore: Send + Sync {
    /// Record `key` if unseen inside `window`.
    ///
    /// Returns `true` when the key is new (event should proceed) and
    /// `false` when it was already present.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is unreachable. Callers treat
    /// this as "unseen" so a store outage cannot drop events.
    async fn check_and_insert(
        &self,
        key: &DedupeKey,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<bool, String>;

    /// Forget `key` so a later redelivery is treated as new.
    ///
    /// Used when an event is admitted past dedupe but rejected further
    /// down the gate; the rejection must not poison its retry.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is unreachable.
    async fn remove(&self, key: &DedupeKey) -> Result<(), String>;
}

/// In-memory dedupe store with lazy expiry.
#[derive(Default)]
pub struct InMemoryDedupeStore {
    seen: RwLock<HashMap<DedupeKey, DateTime<Utc>>>,
}

impl InMemoryDedupeStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DedupeStore for InMemoryDedupeStore {
    async fn check_and_insert(
        &self,
        key: &DedupeKey,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<bool, String> {
        let window = ChronoDuration::from_std(window).map_err(|e| e.to_string())?;
        let mut seen = self.seen.write().await;

        // Drop expired entries so the map stays bounded by the window.
        seen.retain(|_, seen_at| now.signed_duration_since(*seen_at) < window);

        if seen.contains_key(key) {
            return Ok(false);
        }
        seen.insert(key.clone(), now);
        Ok(true)
    }

    async fn remove(&self, key: &DedupeKey) -> Result<(), String> {
        self.seen.write().await.remove(key);
        Ok(())
    }
}

/// Token bucket rate limiter, one bucket per source.
///
/// Tokens refill at a constant rate and each admitted event consumes
/// one. An empty bucket rejects the event.
pub struct RateLimiter {
    capacity: usize,
    refill_rate: f64,
    buckets: RwLock<HashMap<String, BucketState>>,
}

struct BucketState {
    tokens: f64,
    last_refill: std::time::Instant,
}

impl RateLimiter {
    /// Create a limiter with the given burst capacity and refill rate
    /// (tokens per second).
    #[must_use]
    pub fn new(capacity: usize, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// Attempt to take one token from `source`'s bucket.
    ///
    /// Returns `false` when the bucket is empty.
    pub async fn try_acquire(&self, source: &str) -> bool {
        let mut buckets = self.buckets.write().await;
        let now = std::time::Instant::now();
        let capacity = self.capacity as f64;

        let state = buckets.entry(source.to_string()).or_insert(BucketState {
            tokens: capacity,
            last_refill: now,
        });

        // Refill based on elapsed time, capped at capacity.
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            warn!(source, available = state.tokens, "rate limit exceeded");
            false
        }
    }

    /// Current token count for `source`, for monitoring.
    pub async fn available_tokens(&self, source: &str) -> f64 {
        let buckets = self.buckets.read().await;
        buckets
            .get(source)
            .map_or(self.capacity as f64, |s| s.tokens)
    }
}

/// The admission gate itself.
pub struct AdmissionGate {
    dedupe: Arc<dyn DedupeStore>,
    limiter: RateLimiter,
    dedupe_window: Duration,
}

impl AdmissionGate {
    /// Build a gate from policy configuration and a dedupe store.
    #[must_use]
    pub fn new(config: &PolicyConfig, dedupe: Arc<dyn DedupeStore>) -> Self {
        Self {
            dedupe,
            limiter: RateLimiter::new(config.rate_limit_capacity, config.rate_limit_refill_per_sec),
            dedupe_window: config.dedupe_window,
        }
    }

    /// Run the admission checks for one event from `source`.
    ///
    /// Order matters: relevance first (irrelevant events must not
    /// consume dedupe or rate budget), then dedupe, then the rate
    /// limiter.
    pub async fn admit(&self, event: &InboundEvent, source: &str) -> Admission {
        if !is_refund_related(&payload_text(event)) {
            debug!(ticket_id = %event.ticket_id, "ignoring non-refund event");
            return Admission::Ignored;
        }

        let key = event.dedupe_key();
        match self
            .dedupe
            .check_and_insert(&key, event.received_at, self.dedupe_window)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(ticket_id = %event.ticket_id, "dropping duplicate event");
                return Admission::Duplicate;
            }
            Err(e) => {
                // Fail open: a store outage must not drop events.
                warn!(ticket_id = %event.ticket_id, error = %e, "dedupe store unavailable, admitting event");
            }
        }

        if self.limiter.try_acquire(source).await {
            Admission::Accept
        } else {
            // The event never ran; forget it so a retry is not treated
            // as a duplicate.
            if let Err(e) = self.dedupe.remove(&key).await {
                warn!(ticket_id = %event.ticket_id, error = %e, "failed to release dedupe key for rate-limited event");
            }
            Admission::RateLimited
        }
    }
}

/// Whether `text` mentions any refund-related keyword.
#[must_use]
pub fn is_refund_related(text: &str) -> bool {
    let lowered = text.to_lowercase();
    REFUND_KEYWORDS.iter().any(|kw| lowered.contains(kw))
}

/// Flatten the string values of an event payload for keyword matching.
fn payload_text(event: &InboundEvent) -> String {
    let mut out = String::new();
    collect_strings(&event.raw_payload, &mut out);
    out
}

fn collect_strings(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::String(s) => {
            out.push_str(s);
            out.push(' ');
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_strings(item, out);
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values() {
                collect_strings(item, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use serde_json::json;

    fn refund_event(ticket_id: &str) -> InboundEvent {
        InboundEvent::new(
            ticket_id,
            json!({ "subject": "Refund request", "description": "I was charged twice" }),
        )
    }

    fn gate() -> AdmissionGate {
        AdmissionGate::new(
            &PolicyConfig::default(),
            Arc::new(InMemoryDedupeStore::new()),
        )
    }

    #[tokio::test]
    async fn accepts_refund_event() {
        let gate = gate();
        let event = refund_event("100");
        assert_eq!(gate.admit(&event, "freshdesk").await, Admission::Accept);
    }

    #[tokio::test]
    async fn ignores_unrelated_event() {
        let gate = gate();
        let event = InboundEvent::new(
            "101",
            json!({ "subject": "Where is the entrance?", "description": "Which gate do I use?" }),
        );
        assert_eq!(gate.admit(&event, "freshdesk").await, Admission::Ignored);
    }

    #[tokio::test]
    async fn drops_duplicate_inside_window() {
        let gate = gate();
        let event = refund_event("102").with_event_id("evt_1");
        assert_eq!(gate.admit(&event, "freshdesk").await, Admission::Accept);
        assert_eq!(gate.admit(&event, "freshdesk").await, Admission::Duplicate);
    }

    #[tokio::test]
    async fn admits_again_after_window_expiry() {
        let store = InMemoryDedupeStore::new();
        let key = refund_event("103").dedupe_key();
        let t0 = Utc::now();
        let window = Duration::from_secs(300);

        assert!(store.check_and_insert(&key, t0, window).await.unwrap());
        assert!(!store.check_and_insert(&key, t0, window).await.unwrap());

        let later = t0 + ChronoDuration::seconds(301);
        assert!(store.check_and_insert(&key, later, window).await.unwrap());
    }

    #[tokio::test]
    async fn fails_open_when_store_errors() {
        struct BrokenStore;

        #[async_trait]
        impl DedupeStore for BrokenStore {
            async fn check_and_insert(
                &self,
                _key: &DedupeKey,
                _now: DateTime<Utc>,
                _window: Duration,
            ) -> Result<bool, String> {
                Err("connection refused".to_string())
            }

            async fn remove(&self, _key: &DedupeKey) -> Result<(), String> {
                Err("connection refused".to_string())
            }
        }

        let gate = AdmissionGate::new(&PolicyConfig::default(), Arc::new(BrokenStore));
        let event = refund_event("104");
        assert_eq!(gate.admit(&event, "freshdesk").await, Admission::Accept);
    }

    #[tokio::test]
    async fn rate_limits_burst_beyond_capacity() {
        let limiter = RateLimiter::new(3, 0.001);
        for _ in 0..3 {
            assert!(limiter.try_acquire("freshdesk").await);
        }
        assert!(!limiter.try_acquire("freshdesk").await);
        // Separate source gets its own bucket.
        assert!(limiter.try_acquire("zendesk").await);
    }

    #[tokio::test]
    async fn limiter_refills_over_time() {
        let limiter = RateLimiter::new(1, 50.0);
        assert!(limiter.try_acquire("s").await);
        assert!(!limiter.try_acquire("s").await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(limiter.try_acquire("s").await);
    }

    #[tokio::test]
    async fn rate_limited_event_can_be_retried() {
        let config = PolicyConfig {
            rate_limit_capacity: 1,
            rate_limit_refill_per_sec: 50.0,
            ..PolicyConfig::default()
        };
        let gate = AdmissionGate::new(&config, Arc::new(InMemoryDedupeStore::new()));
        let first = refund_event("105").with_event_id("evt_a");
        let second = refund_event("106").with_event_id("evt_b");

        assert_eq!(gate.admit(&first, "freshdesk").await, Admission::Accept);
        assert_eq!(
            gate.admit(&second, "freshdesk").await,
            Admission::RateLimited
        );

        // Once the bucket refills the rejected event's retry must be
        // admitted, not dropped as a duplicate.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(gate.admit(&second, "freshdesk").await, Admission::Accept);
        // The event that did run is still deduplicated.
        assert_eq!(gate.admit(&first, "freshdesk").await, Admission::Duplicate);
    }

    #[test]
    fn refund_relevance_keywords() {
        assert!(is_refund_related("Please REFUND my booking"));
        assert!(is_refund_related("I want my money back"));
        assert!(is_refund_related("filed a chargeback with my bank"));
        assert!(!is_refund_related("what are your opening hours?"));
    }
}
