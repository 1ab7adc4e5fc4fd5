//! Deterministic rule engine.
//!
//! Pure function over booking facts and ticket text; no I/O, no clock
//! reads (the event's receipt time is passed in). Rules are evaluated
//! top-down, first match wins: hard denials, then data validation, then
//! timing, then recognized refund scenarios. A used or third-party pass
//! can never be approved just because it also looks pre-arrival.

use chrono::{DateTime, Utc};
use refund_triage_core::{
    BookingFacts, BookingType, Confidence, PolicyConfig, PolicyRule, RuleDecision, RuleVerdict,
};
use tracing::debug;

const OVERSOLD_KEYWORDS: &[&str] = &[
    "oversold",
    "full",
    "no space",
    "no spots",
    "at capacity",
    "turned away",
    "garage full",
    "lot full",
    "sold out",
];

const DUPLICATE_KEYWORDS: &[&str] = &[
    "duplicate",
    "charged twice",
    "double charge",
    "two passes",
    "bought twice",
    "multiple passes",
    "same time",
    "two bookings",
    "charged 2 times",
    "billed twice",
    "double booking",
];

const PAID_AGAIN_KEYWORDS: &[&str] = &[
    "paid again",
    "charged at gate",
    "paid onsite",
    "paid on-site",
    "paid twice",
    "charged extra",
    "had to pay",
];

const CLOSED_KEYWORDS: &[&str] = &[
    "closed",
    "gate down",
    "flooded",
    "power out",
    "no power",
    "elevator broken",
    "lift broken",
    "no lights",
    "lights off",
    "no attendant",
    "nobody there",
    "shut down",
    "not open",
];

const ACCESSIBILITY_KEYWORDS: &[&str] = &[
    "road closed",
    "street closed",
    "blocked",
    "police block",
    "construction",
    "parade",
    "barricade",
    "can't access",
    "couldn't access",
    "unable to access",
    "no access",
    "blocked off",
    "road closure",
    "detour",
    "emergency",
];

const REBOOK_KEYWORDS: &[&str] = &["confirmed re-book", "confirmed rebook", "rebooked"];

/// Deterministic policy evaluation.
pub struct RuleEngine {
    config: PolicyConfig,
}

impl RuleEngine {
    /// Build an engine with the given policy thresholds.
    #[must_use]
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    /// Evaluate the policy rules for one ticket.
    ///
    /// `received_at` is when the triggering event arrived; timing is
    /// computed against its date, never against the wall clock.
    #[must_use]
    pub fn evaluate(
        &self,
        facts: &BookingFacts,
        ticket_text: &str,
        received_at: DateTime<Utc>,
    ) -> RuleVerdict {
        let verdict = self.evaluate_inner(facts, &ticket_text.to_lowercase(), received_at);
        debug!(
            decision = %verdict.decision,
            rule = %verdict.policy_rule,
            confidence = %verdict.confidence,
            "rule evaluation complete"
        );
        verdict
    }

    fn evaluate_inner(
        &self,
        facts: &BookingFacts,
        text: &str,
        received_at: DateTime<Utc>,
    ) -> RuleVerdict {
        let duplicate_claim = contains_any(text, DUPLICATE_KEYWORDS);

        // 1. Non-refundable categories. A season package is exempt only
        //    when the customer claims a duplicate charge.
        let non_refundable = match facts.booking_type {
            BookingType::OnDemand | BookingType::ThirdParty => true,
            BookingType::Season => !duplicate_claim,
            BookingType::Confirmed | BookingType::Unknown => false,
        };
        if non_refundable {
            return RuleVerdict {
                decision: RuleDecision::Denied,
                policy_rule: PolicyRule::NonRefundableCategory,
                confidence: Confidence::High,
                reasoning: format!(
                    "booking type {} is non-refundable under policy",
                    facts.booking_type
                ),
            };
        }

        // 2. Data validation. Without identity and timing there is
        //    nothing to decide on; multiple bookings must never be
        //    collapsed to one silently.
        if facts.has_multiple_bookings() {
            return RuleVerdict {
                decision: RuleDecision::Uncertain,
                policy_rule: PolicyRule::DataValidation,
                confidence: Confidence::Low,
                reasoning: "multiple bookings referenced in one ticket; cannot pick one"
                    .to_string(),
            };
        }
        let (Some(event_date), Some(_)) = (facts.event_date, facts.booking_id.as_ref()) else {
            return RuleVerdict {
                decision: RuleDecision::Uncertain,
                policy_rule: PolicyRule::DataValidation,
                confidence: Confidence::Low,
                reasoning: "booking id or event date missing; cannot compute timing".to_string(),
            };
        };

        // 3. Timing relative to the event. Negative means the event has
        //    already passed.
        let days_before_event = (event_date - received_at.date_naive()).num_days();

        // 4. Pre-arrival cancellations are approved regardless of
        //    amount.
        if days_before_event >= 0 {
            return RuleVerdict {
                decision: RuleDecision::Approved,
                policy_rule: PolicyRule::PreArrival,
                confidence: Confidence::High,
                reasoning: format!(
                    "cancellation requested {days_before_event} day(s) before the event"
                ),
            };
        }

        // 5. Recognized scenarios that approve outright.
        if duplicate_claim {
            return RuleVerdict {
                decision: RuleDecision::Approved,
                policy_rule: PolicyRule::DuplicateBooking,
                confidence: Confidence::High,
                reasoning: "customer reports a duplicate booking / double charge".to_string(),
            };
        }
        if contains_any(text, REBOOK_KEYWORDS) {
            return RuleVerdict {
                decision: RuleDecision::Approved,
                policy_rule: PolicyRule::ConfirmedRebook,
                confidence: Confidence::High,
                reasoning: "customer confirmed a re-book of the affected reservation".to_string(),
            };
        }
        if contains_any(text, PAID_AGAIN_KEYWORDS) {
            return RuleVerdict {
                decision: RuleDecision::Approved,
                policy_rule: PolicyRule::PaidAgain,
                confidence: Confidence::High,
                reasoning: "customer had to pay on-site despite a valid booking".to_string(),
            };
        }

        // 6. Incident scenarios (oversold, closed, inaccessible) are
        //    auto-approved only for small amounts and timely claims;
        //    otherwise they escalate. The amount alone never authorizes
        //    a rule-engine denial.
        let incident_rule = if contains_any(text, OVERSOLD_KEYWORDS) {
            Some(PolicyRule::Oversold)
        } else if contains_any(text, CLOSED_KEYWORDS) {
            Some(PolicyRule::ClosedLocation)
        } else if contains_any(text, ACCESSIBILITY_KEYWORDS) {
            Some(PolicyRule::Accessibility)
        } else {
            None
        };
        if let Some(policy_rule) = incident_rule {
            let days_past = days_before_event.unsigned_abs();
            if days_past > u64::from(self.config.refund_window_days) {
                return RuleVerdict {
                    decision: RuleDecision::Uncertain,
                    policy_rule,
                    confidence: Confidence::Medium,
                    reasoning: format!(
                        "incident claimed {days_past} day(s) after the event, outside the {}-day window",
                        self.config.refund_window_days
                    ),
                };
            }
            return match facts.amount {
                Some(amount) if amount <= self.config.auto_approve_threshold => RuleVerdict {
                    decision: RuleDecision::Approved,
                    policy_rule,
                    confidence: Confidence::High,
                    reasoning: format!(
                        "{policy_rule} reported; ${amount:.2} is within the ${:.2} auto-approve threshold",
                        self.config.auto_approve_threshold
                    ),
                },
                Some(amount) => RuleVerdict {
                    decision: RuleDecision::Uncertain,
                    policy_rule,
                    confidence: Confidence::Medium,
                    reasoning: format!(
                        "{policy_rule} reported but ${amount:.2} exceeds the ${:.2} auto-approve threshold",
                        self.config.auto_approve_threshold
                    ),
                },
                None => RuleVerdict {
                    decision: RuleDecision::Uncertain,
                    policy_rule,
                    confidence: Confidence::Medium,
                    reasoning: format!("{policy_rule} reported but the booking amount is unknown"),
                },
            };
        }

        // 7. Post-event with no recognized exception.
        RuleVerdict {
            decision: RuleDecision::Denied,
            policy_rule: PolicyRule::PostEvent,
            confidence: Confidence::High,
            reasoning: "post-event cancellation, no exception applies".to_string(),
        }
    }

    /// Fallback verdict when nothing matched at all. Reached only for
    /// facts that bypass timing, kept separate so the orchestrator can
    /// report it distinctly.
    #[must_use]
    pub fn edge_case() -> RuleVerdict {
        RuleVerdict {
            decision: RuleDecision::Uncertain,
            policy_rule: PolicyRule::EdgeCase,
            confidence: Confidence::Low,
            reasoning: "no policy rule matched this case".to_string(),
        }
    }
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| text.contains(kw))
}
