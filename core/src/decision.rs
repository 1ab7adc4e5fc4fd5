//! The terminal decision artifact and its invariants.

use crate::error::TriageError;
use crate::facts::Confidence;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Final triage outcome for a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalDecision {
    /// Refund approved.
    Approved,
    /// Refund denied.
    Denied,
    /// Ambiguous, missing information, or processing failure; a human
    /// must review.
    NeedsHumanReview,
}

impl fmt::Display for FinalDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::Denied => write!(f, "denied"),
            Self::NeedsHumanReview => write!(f, "needs_human_review"),
        }
    }
}

/// Which stage produced the final decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionMethod {
    /// Deterministic rule evaluation was conclusive.
    Rules,
    /// The generative analyzer decided.
    Llm,
    /// The analyzer failed and the rule verdict was reused.
    Fallback,
    /// A processing failure was converted into a review escalation.
    Error,
}

impl fmt::Display for DecisionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rules => write!(f, "rules"),
            Self::Llm => write!(f, "llm"),
            Self::Fallback => write!(f, "fallback"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Cancellation reason accepted by the booking platform's dropdown.
///
/// Closed set; display strings must match the dropdown text exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReason {
    /// No clearer match.
    Other,
    /// Goodwill / courtesy exception.
    Tolerance,
    /// Multi-day booking adjustment.
    MultiDay,
    /// Customer will rebook.
    PendingRebook,
    /// Cancelled before the booked start time.
    PreArrival,
    /// Location was oversold.
    Oversold,
    /// No attendant on site.
    NoAttendant,
    /// Advertised amenity missing.
    AmenityMissing,
    /// General poor experience.
    PoorExperience,
    /// Posted hours were wrong.
    InaccurateHours,
    /// Attendant refused the customer.
    AttendantRefused,
    /// Duplicate booking.
    DuplicateBooking,
    /// Customer already rebooked.
    ConfirmedRebook,
    /// Customer paid again on-site.
    PaidAgain,
    /// Customer could not access the location.
    Accessibility,
    /// Platform-initiated cancellation.
    PwCancellation,
}

impl fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other => write!(f, "Other"),
            Self::Tolerance => write!(f, "Tolerance"),
            Self::MultiDay => write!(f, "Multi-day"),
            Self::PendingRebook => write!(f, "Pending re-book"),
            Self::PreArrival => write!(f, "Pre-arrival"),
            Self::Oversold => write!(f, "Oversold"),
            Self::NoAttendant => write!(f, "No attendant"),
            Self::AmenityMissing => write!(f, "Amenity missing"),
            Self::PoorExperience => write!(f, "Poor experience"),
            Self::InaccurateHours => write!(f, "Inaccurate hours of operation"),
            Self::AttendantRefused => write!(f, "Attendant refused customer"),
            Self::DuplicateBooking => write!(f, "Duplicate booking"),
            Self::ConfirmedRebook => write!(f, "Confirmed re-book"),
            Self::PaidAgain => write!(f, "Paid again"),
            Self::Accessibility => write!(f, "Accessibility"),
            Self::PwCancellation => write!(f, "PW cancellation"),
        }
    }
}

/// The terminal, auditable artifact of one triage run.
///
/// Created at pipeline entry, filled incrementally, sealed at exit.
/// Never mutated afterward; corrections are new decisions referencing
/// the same `ticket_id`. Exactly one decision exists per `run_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// Correlation id for this processing attempt.
    pub run_id: Uuid,
    /// Ticket this decision is for.
    pub ticket_id: String,
    /// Final outcome.
    pub final_decision: FinalDecision,
    /// Stage that produced the outcome.
    pub method: DecisionMethod,
    /// Confidence of the last stage that ran; never blended or
    /// upgraded by a later stage.
    pub confidence: Confidence,
    /// Human-readable explanation.
    pub reasoning: String,
    /// Policy rule or section the decision rests on.
    pub policy_reference: String,
    /// Present iff `final_decision` is approved.
    pub cancellation_reason: Option<CancellationReason>,
    /// End-to-end pipeline latency.
    pub processing_time_ms: u64,
    /// When the decision was sealed.
    pub created_at: DateTime<Utc>,
}

impl Decision {
    /// Check the decision invariants before sealing.
    ///
    /// A violation here is a programming defect, not a policy outcome:
    /// it must fail loudly rather than be silently patched.
    ///
    /// # Errors
    ///
    /// Returns [`TriageError::InvariantViolation`] when
    /// `cancellation_reason` presence does not match an approved
    /// outcome.
    pub fn validate(&self) -> Result<(), TriageError> {
        let approved = self.final_decision == FinalDecision::Approved;
        match (approved, self.cancellation_reason) {
            (true, None) => Err(TriageError::InvariantViolation(format!(
                "approved decision for ticket {} has no cancellation reason",
                self.ticket_id
            ))),
            (false, Some(reason)) => Err(TriageError::InvariantViolation(format!(
                "non-approved decision for ticket {} carries cancellation reason {reason}",
                self.ticket_id
            ))),
            _ => Ok(()),
        }
    }
}
