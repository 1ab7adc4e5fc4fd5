//! Rule-engine and analyzer verdicts.

use crate::decision::FinalDecision;
use crate::facts::Confidence;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of deterministic rule evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleDecision {
    /// Clear policy support for the refund.
    Approved,
    /// Clear policy violation, refund not warranted.
    Denied,
    /// No rule was conclusive; escalate to the analyzer.
    Uncertain,
}

impl fmt::Display for RuleDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::Denied => write!(f, "denied"),
            Self::Uncertain => write!(f, "uncertain"),
        }
    }
}

/// The policy rule that decided (or failed to decide) a case.
///
/// Rules are evaluated top-down, first match wins. Hard denials precede
/// refund-eligibility checks, which precede timing checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyRule {
    /// On-demand, season-without-duplicate, or third-party booking.
    NonRefundableCategory,
    /// Missing booking id / event date, or multiple bookings flagged.
    DataValidation,
    /// Cancellation requested at or before the booked start time.
    PreArrival,
    /// Customer reports a duplicate booking.
    DuplicateBooking,
    /// Customer already rebooked at the correct location.
    ConfirmedRebook,
    /// Customer had to pay again on-site despite a valid booking.
    PaidAgain,
    /// Location was oversold / full.
    Oversold,
    /// Location was closed or inoperable.
    ClosedLocation,
    /// Customer could not reach the location (road closure etc.).
    Accessibility,
    /// Post-event cancellation with no recognized exception.
    PostEvent,
    /// Nothing matched; requires analyzer judgment.
    EdgeCase,
}

impl fmt::Display for PolicyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonRefundableCategory => write!(f, "Non-Refundable Category"),
            Self::DataValidation => write!(f, "Data Validation"),
            Self::PreArrival => write!(f, "Pre-Arrival"),
            Self::DuplicateBooking => write!(f, "Duplicate Booking"),
            Self::ConfirmedRebook => write!(f, "Confirmed Re-book"),
            Self::PaidAgain => write!(f, "Paid Again"),
            Self::Oversold => write!(f, "Oversold Location"),
            Self::ClosedLocation => write!(f, "Closed Location"),
            Self::Accessibility => write!(f, "Accessibility Issue"),
            Self::PostEvent => write!(f, "Post-Event Cancellation"),
            Self::EdgeCase => write!(f, "Edge Case"),
        }
    }
}

/// Pure output of rule evaluation over booking facts. No side effects;
/// immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleVerdict {
    /// The rule decision.
    pub decision: RuleDecision,
    /// Which rule fired.
    pub policy_rule: PolicyRule,
    /// Trust level of this verdict.
    pub confidence: Confidence,
    /// Human-readable explanation.
    pub reasoning: String,
}

impl RuleVerdict {
    /// Whether this verdict is conclusive enough to skip the analyzer:
    /// approved or denied with at least medium confidence.
    #[must_use]
    pub fn is_conclusive(&self) -> bool {
        self.decision != RuleDecision::Uncertain && self.confidence >= Confidence::Medium
    }
}

/// Output of the generative analyzer, produced only when the rule
/// verdict was uncertain or low-confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisVerdict {
    /// The analyzer's decision.
    pub decision: FinalDecision,
    /// Trust level of this verdict.
    pub confidence: Confidence,
    /// Policy rule or section the analyzer cited.
    pub policy_reference: String,
    /// Detailed explanation of the decision.
    pub reasoning: String,
    /// Factors that influenced the decision.
    pub key_factors: Vec<String>,
    /// Wall-clock latency of the backend call.
    pub latency_ms: u64,
    /// True when the backend failed and the rule verdict was reused
    /// verbatim. Fallback is explicit, never a silent substitution.
    pub fallback: bool,
}
