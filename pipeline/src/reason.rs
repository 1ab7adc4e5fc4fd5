//! Mapping approved decisions to the booking platform's cancellation
//! reason dropdown.
//!
//! Two paths: a static lookup keyed by the winning policy rule (used
//! when the rule engine decided), and a keyword scan over the decision
//! text (used for analyzer approvals, where the winning scenario is
//! only described in prose). Applied only to approved outcomes.

use refund_triage_core::{CancellationReason, PolicyRule};

/// Static mapping from the rule that approved to the dropdown reason.
#[must_use]
pub fn reason_for_rule(rule: PolicyRule) -> CancellationReason {
    match rule {
        PolicyRule::PreArrival => CancellationReason::PreArrival,
        PolicyRule::DuplicateBooking => CancellationReason::DuplicateBooking,
        PolicyRule::ConfirmedRebook => CancellationReason::ConfirmedRebook,
        PolicyRule::PaidAgain => CancellationReason::PaidAgain,
        PolicyRule::Oversold => CancellationReason::Oversold,
        PolicyRule::ClosedLocation => CancellationReason::InaccurateHours,
        PolicyRule::Accessibility => CancellationReason::Accessibility,
        // Denial and escalation rules never approve; if one somehow
        // reaches here, the generic bucket is the only honest answer.
        PolicyRule::NonRefundableCategory
        | PolicyRule::DataValidation
        | PolicyRule::PostEvent
        | PolicyRule::EdgeCase => CancellationReason::Other,
    }
}

/// Keyword patterns checked in order; first match wins.
const KEYWORD_PATTERNS: &[(CancellationReason, &[&str])] = &[
    (
        CancellationReason::Oversold,
        &["oversold", "over-sold", "overbooked", "over-booked", "sold out"],
    ),
    (
        CancellationReason::DuplicateBooking,
        &["duplicate", "duplicated", "double booking", "booked twice"],
    ),
    (
        CancellationReason::PreArrival,
        &["pre-arrival", "pre arrival", "before event", "advance cancellation"],
    ),
    (
        CancellationReason::Tolerance,
        &["tolerance", "goodwill", "customer satisfaction", "exception", "courtesy"],
    ),
    (
        CancellationReason::AmenityMissing,
        &["amenity", "amenities", "missing feature"],
    ),
    (
        CancellationReason::PoorExperience,
        &["poor experience", "complaint", "dissatisfied", "unhappy", "bad experience"],
    ),
    (
        CancellationReason::NoAttendant,
        &["no attendant", "attendant missing", "no staff", "unmanned"],
    ),
    (
        CancellationReason::AttendantRefused,
        &["attendant refused", "refused entry", "denied access"],
    ),
    (
        CancellationReason::InaccurateHours,
        &["hours", "closed", "operating hours", "wrong hours"],
    ),
    (
        CancellationReason::MultiDay,
        &["multi-day", "multiple days", "multi day"],
    ),
    (
        CancellationReason::PendingRebook,
        &["pending re-book", "pending rebook", "will rebook"],
    ),
    (
        CancellationReason::ConfirmedRebook,
        &["confirmed re-book", "confirmed rebook", "rebooked"],
    ),
    (
        CancellationReason::PaidAgain,
        &["paid again", "double charged", "charged twice", "duplicate payment"],
    ),
    (
        CancellationReason::Accessibility,
        &["accessibility", "accessible", "ada", "disability", "wheelchair"],
    ),
    (
        CancellationReason::PwCancellation,
        &["pw cancel", "system cancel", "platform cancel"],
    ),
];

/// Map free-text decision reasoning to a dropdown reason.
///
/// Used for analyzer approvals. Falls back to `Other` when nothing
/// matches.
#[must_use]
pub fn reason_from_text(reasoning: &str, policy_reference: &str) -> CancellationReason {
    let combined = format!("{reasoning} {policy_reference}").to_lowercase();
    for (reason, keywords) in KEYWORD_PATTERNS {
        if keywords.iter().any(|kw| combined.contains(kw)) {
            return *reason;
        }
    }
    CancellationReason::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_lookup_covers_approval_rules() {
        assert_eq!(
            reason_for_rule(PolicyRule::PreArrival),
            CancellationReason::PreArrival
        );
        assert_eq!(
            reason_for_rule(PolicyRule::Oversold),
            CancellationReason::Oversold
        );
        assert_eq!(
            reason_for_rule(PolicyRule::ClosedLocation),
            CancellationReason::InaccurateHours
        );
        assert_eq!(
            reason_for_rule(PolicyRule::PaidAgain),
            CancellationReason::PaidAgain
        );
    }

    #[test]
    fn non_approval_rules_map_to_other() {
        assert_eq!(
            reason_for_rule(PolicyRule::PostEvent),
            CancellationReason::Other
        );
        assert_eq!(
            reason_for_rule(PolicyRule::EdgeCase),
            CancellationReason::Other
        );
    }

    #[test]
    fn text_mapping_matches_keywords() {
        assert_eq!(
            reason_from_text("The location was oversold that evening", ""),
            CancellationReason::Oversold
        );
        assert_eq!(
            reason_from_text("Customer was double charged for one pass", ""),
            CancellationReason::PaidAgain
        );
        assert_eq!(
            reason_from_text("Approved as a goodwill gesture", ""),
            CancellationReason::Tolerance
        );
        assert_eq!(
            reason_from_text("", "Closed Location"),
            CancellationReason::InaccurateHours
        );
    }

    #[test]
    fn unmatched_text_falls_back_to_other() {
        assert_eq!(
            reason_from_text("approved for reasons", "section 9"),
            CancellationReason::Other
        );
    }

    #[test]
    fn earlier_patterns_win() {
        // "duplicate" outranks "charged twice" ordering-wise.
        assert_eq!(
            reason_from_text("duplicate booking, charged twice", ""),
            CancellationReason::DuplicateBooking
        );
    }
}
