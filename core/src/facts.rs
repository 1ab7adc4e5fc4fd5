//! Structured booking facts extracted from ticket text.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Categorical trust level attached to an extraction or decision.
///
/// Never a blended numeric score. Ordered so confidence floors can be
/// compared (`Low < Medium < High`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Uncertain, borderline, or missing critical information.
    Low,
    /// Reasonable but with some ambiguity.
    Medium,
    /// Clear-cut with strong support.
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Booking product category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingType {
    /// Advance booking with a confirmed slot.
    Confirmed,
    /// Same-day / instant on-demand product. Non-refundable category.
    OnDemand,
    /// Season package. Non-refundable unless flagged as a duplicate.
    Season,
    /// Booked through a third-party merchant of record. Non-refundable
    /// here; the third party owns the refund.
    ThirdParty,
    /// Could not be determined from the ticket.
    Unknown,
}

impl fmt::Display for BookingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confirmed => write!(f, "confirmed"),
            Self::OnDemand => write!(f, "on_demand"),
            Self::Season => write!(f, "season"),
            Self::ThirdParty => write!(f, "third_party"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// How the booking facts were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    /// Literal pattern match against structured ticket text.
    Pattern,
    /// Schema-constrained generative extraction.
    Generative,
    /// Both tiers failed; facts are empty or partial.
    None,
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern => write!(f, "pattern"),
            Self::Generative => write!(f, "generative"),
            Self::None => write!(f, "none"),
        }
    }
}

/// A field the extractor could not resolve, or a marker that forces
/// escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingField {
    /// No booking identifier found.
    BookingId,
    /// No event start date found.
    EventDate,
    /// No booking amount found.
    Amount,
    /// No facility / location found.
    Location,
    /// More than one booking referenced in the ticket. Mandatory
    /// escalation marker; downstream logic must not pick one silently.
    MultipleBookings,
}

impl fmt::Display for MissingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BookingId => write!(f, "booking_id"),
            Self::EventDate => write!(f, "event_date"),
            Self::Amount => write!(f, "amount"),
            Self::Location => write!(f, "location"),
            Self::MultipleBookings => write!(f, "multiple_bookings"),
        }
    }
}

/// Structured booking facts for one ticket, produced once per run.
///
/// Never mutated after creation; a re-run produces a new instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingFacts {
    /// Booking identifier, e.g. `PW-12345` or a bare confirmation number.
    pub booking_id: Option<String>,
    /// Scheduled event (parking) start date.
    pub event_date: Option<NaiveDate>,
    /// When the booking was made, if recovered.
    pub reservation_date: Option<NaiveDate>,
    /// Booking product category.
    pub booking_type: BookingType,
    /// Booking amount in USD.
    pub amount: Option<f64>,
    /// Facility name or address.
    pub location: Option<String>,
    /// Customer email, if present in the ticket.
    pub customer_email: Option<String>,
    /// How these facts were obtained.
    pub extraction_method: ExtractionMethod,
    /// Trust level. Monotonic with method: a pattern match can be high,
    /// generative extraction tops out at medium, `none` is always low.
    pub confidence: Confidence,
    /// Fields that could not be resolved, plus escalation markers.
    pub missing_fields: BTreeSet<MissingField>,
}

impl BookingFacts {
    /// Facts representing a failed extraction: nothing found, low
    /// confidence, both critical fields marked missing.
    #[must_use]
    pub fn empty() -> Self {
        let mut missing = BTreeSet::new();
        missing.insert(MissingField::BookingId);
        missing.insert(MissingField::EventDate);
        Self {
            booking_id: None,
            event_date: None,
            reservation_date: None,
            booking_type: BookingType::Unknown,
            amount: None,
            location: None,
            customer_email: None,
            extraction_method: ExtractionMethod::None,
            confidence: Confidence::Low,
            missing_fields: missing,
        }
    }

    /// Whether the minimum field set (booking id AND event date) was
    /// recovered.
    #[must_use]
    pub fn has_minimum_fields(&self) -> bool {
        self.booking_id.is_some() && self.event_date.is_some()
    }

    /// Whether the multiple-bookings escalation marker is set.
    #[must_use]
    pub fn has_multiple_bookings(&self) -> bool {
        self.missing_fields.contains(&MissingField::MultipleBookings)
    }
}
