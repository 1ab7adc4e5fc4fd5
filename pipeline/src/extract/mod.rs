//! Two-tier booking-fact extraction.
//!
//! The pattern tier runs first and short-circuits for structured
//! tickets: once it recovers the minimum field set (booking id and
//! event date) the generative tier never runs. Only when that minimum
//! set is missing does the generative tier get a try; when that fails
//! too, whatever the patterns found is used at low confidence.
//! Extraction is total: every path produces [`BookingFacts`], never an
//! error.

pub mod patterns;

use crate::connectors::BookingProvider;
use async_trait::async_trait;
use chrono::NaiveDate;
use refund_triage_core::{
    BookingFacts, BookingType, Confidence, ExtractionMethod, MissingField, PolicyConfig,
};
use refund_triage_gemini::GeminiClient;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use patterns::PatternFields;

/// Structured output of the generative tier.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerativeExtraction {
    /// Whether any booking information was found.
    #[serde(default)]
    pub found: bool,
    /// Booking identifier.
    pub booking_id: Option<String>,
    /// Amount in dollars.
    pub amount: Option<f64>,
    /// Reservation date, ISO format.
    pub reservation_date: Option<String>,
    /// Event date, ISO format.
    pub event_date: Option<String>,
    /// Facility name or address.
    pub location: Option<String>,
    /// Booking product category as free text.
    pub booking_type: Option<String>,
    /// Customer email.
    pub customer_email: Option<String>,
    /// Whether more than one booking is referenced.
    #[serde(default)]
    pub multiple_bookings: bool,
}

/// Generative extraction backend.
///
/// One implementation per model provider; the extractor only needs the
/// structured result or a failure reason.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Extract booking facts from raw ticket text.
    ///
    /// # Errors
    ///
    /// Returns a human-readable failure reason; the extractor treats
    /// any error as "tier unavailable" and falls back.
    async fn extract(
        &self,
        ticket_text: &str,
        timeout: Duration,
    ) -> Result<GenerativeExtraction, String>;
}

/// Gemini-backed extraction.
pub struct GeminiExtractionBackend {
    client: GeminiClient,
}

impl GeminiExtractionBackend {
    /// Wrap a Gemini client.
    #[must_use]
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

fn extraction_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "booking_id": { "type": "string" },
            "amount": { "type": "number" },
            "reservation_date": { "type": "string" },
            "event_date": { "type": "string" },
            "location": { "type": "string" },
            "booking_type": { "type": "string" },
            "customer_email": { "type": "string" },
            "found": { "type": "boolean" },
            "multiple_bookings": { "type": "boolean" }
        },
        "required": ["found"]
    })
}

fn extraction_prompt(ticket_text: &str) -> String {
    format!(
        r#"Extract booking information from the following ticket notes. Look for:

1. **Booking ID**: Any reference number like "PW-12345", "509266779", "Booking #123", etc.
2. **Amount**: Dollar amounts like "$45.00", "45 dollars", etc.
3. **Reservation Date**: When the booking was made
4. **Event Date**: When the parking was scheduled for (start date) - THIS IS THE MOST CRITICAL FIELD
5. **Location**: Parking facility name or address
6. **Booking Type**: "confirmed", "on-demand", "season", "third-party", or "unknown"
7. **Customer Email**: Email address of the customer

**Important Instructions:**
- If multiple bookings are mentioned, extract information for the PRIMARY booking being disputed
- Set "found" to true if you find at least a booking ID or event date
- Set "multiple_bookings" to true if more than one booking is referenced
- Use ISO format (YYYY-MM-DD) for dates - ALWAYS include the full 4-digit year
- If a date includes a time, ignore the time and extract only the date
- If a field is not found, omit it from the response

**Ticket Notes:**
{ticket_text}

Extract the booking information as JSON."#
    )
}

#[async_trait]
impl ExtractionBackend for GeminiExtractionBackend {
    async fn extract(
        &self,
        ticket_text: &str,
        timeout: Duration,
    ) -> Result<GenerativeExtraction, String> {
        let value = self
            .client
            .infer(&extraction_prompt(ticket_text), extraction_schema(), timeout)
            .await
            .map_err(|e| e.to_string())?;
        serde_json::from_value(value).map_err(|e| e.to_string())
    }
}

/// The extractor itself.
///
/// The generative backend and the booking provider are both optional;
/// with neither configured the pattern tier runs alone.
pub struct BookingExtractor {
    backend: Option<Arc<dyn ExtractionBackend>>,
    provider: Option<Arc<dyn BookingProvider>>,
    timeout: Duration,
}

impl BookingExtractor {
    /// Build an extractor from policy configuration.
    #[must_use]
    pub fn new(
        config: &PolicyConfig,
        backend: Option<Arc<dyn ExtractionBackend>>,
        provider: Option<Arc<dyn BookingProvider>>,
    ) -> Self {
        Self {
            backend,
            provider,
            timeout: config.extraction_timeout,
        }
    }

    /// Extract booking facts from ticket text.
    ///
    /// Total: always produces facts, degrading confidence and recording
    /// missing fields instead of failing.
    #[instrument(skip_all)]
    pub async fn extract(&self, ticket_text: &str) -> BookingFacts {
        if ticket_text.trim().is_empty() {
            return BookingFacts::empty();
        }

        let pattern_fields = if patterns::looks_like_html(ticket_text) {
            patterns::extract_from_html(ticket_text)
        } else {
            patterns::extract_from_text(ticket_text)
        };
        let pattern_confidence = pattern_confidence(&pattern_fields);

        let mut facts = if pattern_confidence >= Confidence::Medium {
            debug!(confidence = %pattern_confidence, "pattern extraction succeeded");
            facts_from_patterns(&pattern_fields, pattern_confidence)
        } else {
            self.generative_or_pattern_fallback(ticket_text, &pattern_fields)
                .await
        };

        // More than one distinct booking id is a mandatory escalation
        // marker regardless of which tier produced the facts.
        if pattern_fields.booking_ids.len() > 1 {
            facts.missing_fields.insert(MissingField::MultipleBookings);
        }

        if !facts.has_minimum_fields() {
            self.fill_from_provider(&mut facts).await;
        }

        info!(
            method = %facts.extraction_method,
            confidence = %facts.confidence,
            complete = facts.has_minimum_fields(),
            "extraction finished"
        );
        facts
    }

    async fn generative_or_pattern_fallback(
        &self,
        ticket_text: &str,
        pattern_fields: &PatternFields,
    ) -> BookingFacts {
        let Some(backend) = &self.backend else {
            return facts_from_patterns(pattern_fields, Confidence::Low);
        };

        match backend.extract(ticket_text, self.timeout).await {
            Ok(result) => facts_from_generative(&result),
            Err(e) => {
                warn!(error = %e, "generative extraction failed, using pattern result");
                if pattern_fields.field_count() > 0 {
                    facts_from_patterns(pattern_fields, Confidence::Low)
                } else {
                    BookingFacts::empty()
                }
            }
        }
    }

    /// Fill critical gaps from the booking provider's records.
    ///
    /// Provider data is authoritative for field values but arriving
    /// here means the ticket itself was ambiguous, so confidence stays
    /// capped at medium.
    async fn fill_from_provider(&self, facts: &mut BookingFacts) {
        let Some(provider) = &self.provider else {
            return;
        };
        let Some(email) = facts.customer_email.clone() else {
            return;
        };

        let bookings = match provider.lookup_bookings(&email).await {
            Ok(bookings) => bookings,
            Err(e) => {
                warn!(error = %e, "booking provider lookup failed");
                return;
            }
        };

        match bookings.as_slice() {
            [] => {}
            [booking] => {
                if facts.booking_id.is_none() {
                    facts.booking_id = Some(booking.booking_id.clone());
                    facts.missing_fields.remove(&MissingField::BookingId);
                }
                if facts.event_date.is_none() {
                    facts.event_date = booking
                        .event_date
                        .as_deref()
                        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
                    if facts.event_date.is_some() {
                        facts.missing_fields.remove(&MissingField::EventDate);
                    }
                }
                if facts.amount.is_none() {
                    facts.amount = booking.amount;
                    if facts.amount.is_some() {
                        facts.missing_fields.remove(&MissingField::Amount);
                    }
                }
                if facts.location.is_none() {
                    facts.location = booking.location.clone();
                    if facts.location.is_some() {
                        facts.missing_fields.remove(&MissingField::Location);
                    }
                }
                facts.confidence = facts.confidence.min(Confidence::Medium);
            }
            _ => {
                // Several bookings on file and the ticket did not pin
                // one down. Never pick silently.
                facts.missing_fields.insert(MissingField::MultipleBookings);
            }
        }
    }
}

/// Pattern-tier confidence. The critical pair (booking id and event
/// date) is enough on its own for medium; high additionally requires
/// the secondary fields (amount and location). Anything short of the
/// critical pair is low, which is also what sends the ticket to the
/// generative tier.
fn pattern_confidence(fields: &PatternFields) -> Confidence {
    if fields.booking_id.is_none() || fields.event_date.is_none() {
        return Confidence::Low;
    }
    if fields.amount.is_some() && fields.location.is_some() {
        Confidence::High
    } else {
        Confidence::Medium
    }
}

fn facts_from_patterns(fields: &PatternFields, confidence: Confidence) -> BookingFacts {
    let mut facts = BookingFacts {
        booking_id: fields.booking_id.clone(),
        event_date: fields.event_date,
        reservation_date: fields.reservation_date,
        booking_type: fields.booking_type.unwrap_or(BookingType::Unknown),
        amount: fields.amount,
        location: fields.location.clone(),
        customer_email: fields.customer_email.clone(),
        extraction_method: ExtractionMethod::Pattern,
        confidence,
        missing_fields: std::collections::BTreeSet::new(),
    };
    record_missing(&mut facts);
    facts
}

fn facts_from_generative(result: &GenerativeExtraction) -> BookingFacts {
    let critical = usize::from(result.booking_id.is_some())
        + usize::from(result.event_date.is_some());
    let optional = usize::from(result.amount.is_some())
        + usize::from(result.reservation_date.is_some())
        + usize::from(result.location.is_some())
        + usize::from(result.booking_type.is_some())
        + usize::from(result.customer_email.is_some());

    // Generative output tops out at medium; it cannot be verified
    // against the ticket the way a literal pattern match can.
    let confidence = if !result.found {
        Confidence::Low
    } else if critical == 2 || (critical == 1 && optional >= 3) {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    let mut facts = BookingFacts {
        booking_id: result.booking_id.clone(),
        event_date: parse_iso_date(result.event_date.as_deref()),
        reservation_date: parse_iso_date(result.reservation_date.as_deref()),
        booking_type: parse_booking_type(result.booking_type.as_deref()),
        amount: result.amount,
        location: result.location.clone(),
        customer_email: result.customer_email.clone(),
        extraction_method: ExtractionMethod::Generative,
        confidence,
        missing_fields: std::collections::BTreeSet::new(),
    };
    if result.multiple_bookings {
        facts.missing_fields.insert(MissingField::MultipleBookings);
    }
    record_missing(&mut facts);
    facts
}

fn record_missing(facts: &mut BookingFacts) {
    if facts.booking_id.is_none() {
        facts.missing_fields.insert(MissingField::BookingId);
    }
    if facts.event_date.is_none() {
        facts.missing_fields.insert(MissingField::EventDate);
    }
    if facts.amount.is_none() {
        facts.missing_fields.insert(MissingField::Amount);
    }
    if facts.location.is_none() {
        facts.missing_fields.insert(MissingField::Location);
    }
}

fn parse_iso_date(raw: Option<&str>) -> Option<NaiveDate> {
    raw.and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

fn parse_booking_type(raw: Option<&str>) -> BookingType {
    match raw.map(str::to_lowercase).as_deref() {
        Some("confirmed") => BookingType::Confirmed,
        Some("on-demand" | "on_demand") => BookingType::OnDemand,
        Some("season") => BookingType::Season,
        Some("third-party" | "third_party") => BookingType::ThirdParty,
        _ => BookingType::Unknown,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)] // Test code
mod tests {
    use super::*;
    use crate::connectors::{ConnectorError, ProviderBooking};

    struct FixedBackend(Result<GenerativeExtraction, String>);

    #[async_trait]
    impl ExtractionBackend for FixedBackend {
        async fn extract(
            &self,
            _ticket_text: &str,
            _timeout: Duration,
        ) -> Result<GenerativeExtraction, String> {
            self.0.clone()
        }
    }

    struct FixedProvider(Vec<ProviderBooking>);

    #[async_trait]
    impl BookingProvider for FixedProvider {
        async fn lookup_bookings(
            &self,
            _email: &str,
        ) -> Result<Vec<ProviderBooking>, ConnectorError> {
            Ok(self.0.clone())
        }
    }

    fn extractor(
        backend: Option<Arc<dyn ExtractionBackend>>,
        provider: Option<Arc<dyn BookingProvider>>,
    ) -> BookingExtractor {
        BookingExtractor::new(&PolicyConfig::default(), backend, provider)
    }

    const STRUCTURED_TICKET: &str = "Booking ID: PW-12345\n\
        Event Date: 2026-09-10\n\
        Reservation Date: 2026-08-01\n\
        Amount: $42.00\n\
        Location: Main Street Garage\n\
        this was a confirmed reservation";

    #[tokio::test]
    async fn structured_ticket_skips_generative_tier() {
        struct PanicBackend;

        #[async_trait]
        impl ExtractionBackend for PanicBackend {
            async fn extract(
                &self,
                _ticket_text: &str,
                _timeout: Duration,
            ) -> Result<GenerativeExtraction, String> {
                panic!("generative tier must not run for structured tickets");
            }
        }

        let extractor = extractor(Some(Arc::new(PanicBackend)), None);
        let facts = extractor.extract(STRUCTURED_TICKET).await;
        assert_eq!(facts.extraction_method, ExtractionMethod::Pattern);
        assert_eq!(facts.confidence, Confidence::High);
        assert!(facts.has_minimum_fields());
    }

    #[tokio::test]
    async fn critical_pair_alone_is_medium_and_skips_backend() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingBackend {
            calls: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl ExtractionBackend for CountingBackend {
            async fn extract(
                &self,
                _ticket_text: &str,
                _timeout: Duration,
            ) -> Result<GenerativeExtraction, String> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(GenerativeExtraction::default())
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let backend = CountingBackend {
            calls: Arc::clone(&calls),
        };
        let extractor = extractor(Some(Arc::new(backend)), None);

        let facts = extractor
            .extract("Booking ID: 987654321\nEvent Date: 2026-09-10")
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(facts.extraction_method, ExtractionMethod::Pattern);
        assert_eq!(facts.confidence, Confidence::Medium);
        assert!(facts.has_minimum_fields());
    }

    #[tokio::test]
    async fn secondary_fields_lift_pattern_confidence_to_high() {
        let extractor = extractor(None, None);

        let with_secondary = extractor
            .extract(
                "Booking ID: PW-12345\nEvent Date: 2026-09-10\n\
                 Amount: $42.00\nLocation: Main Street Garage",
            )
            .await;
        assert_eq!(with_secondary.confidence, Confidence::High);

        // Amount without location stays medium.
        let partial = extractor
            .extract("Booking ID: PW-12345\nEvent Date: 2026-09-10\nAmount: $42.00")
            .await;
        assert_eq!(partial.confidence, Confidence::Medium);
    }

    #[tokio::test]
    async fn unstructured_ticket_uses_generative_tier() {
        let backend = FixedBackend(Ok(GenerativeExtraction {
            found: true,
            booking_id: Some("509266779".to_string()),
            event_date: Some("2026-09-10".to_string()),
            amount: Some(30.0),
            ..GenerativeExtraction::default()
        }));
        let extractor = extractor(Some(Arc::new(backend)), None);
        let facts = extractor
            .extract("hi, the lot was full when I got there, please refund")
            .await;
        assert_eq!(facts.extraction_method, ExtractionMethod::Generative);
        assert_eq!(facts.booking_id.as_deref(), Some("509266779"));
        assert_eq!(facts.confidence, Confidence::Medium);
    }

    #[tokio::test]
    async fn double_failure_yields_empty_low_confidence_facts() {
        let backend = FixedBackend(Err("deadline exceeded".to_string()));
        let extractor = extractor(Some(Arc::new(backend)), None);
        let facts = extractor.extract("no structure whatsoever").await;
        assert_eq!(facts.extraction_method, ExtractionMethod::None);
        assert_eq!(facts.confidence, Confidence::Low);
        assert!(!facts.has_minimum_fields());
        assert!(facts.missing_fields.contains(&MissingField::BookingId));
        assert!(facts.missing_fields.contains(&MissingField::EventDate));
    }

    #[tokio::test]
    async fn generative_failure_keeps_partial_pattern_result() {
        let backend = FixedBackend(Err("rate limited".to_string()));
        let extractor = extractor(Some(Arc::new(backend)), None);
        let facts = extractor.extract("refund PW-99999 please").await;
        assert_eq!(facts.extraction_method, ExtractionMethod::Pattern);
        assert_eq!(facts.booking_id.as_deref(), Some("PW-99999"));
        assert_eq!(facts.confidence, Confidence::Low);
    }

    #[tokio::test]
    async fn two_booking_ids_set_escalation_marker() {
        let extractor = extractor(None, None);
        let facts = extractor
            .extract("charged for both PW-11111 and PW-22222 on 2026-09-01, $40.00, lot: Pier 5")
            .await;
        assert!(facts.has_multiple_bookings());
    }

    #[tokio::test]
    async fn generative_multiple_bookings_flag_is_carried() {
        let backend = FixedBackend(Ok(GenerativeExtraction {
            found: true,
            booking_id: Some("PW-1".to_string()),
            multiple_bookings: true,
            ..GenerativeExtraction::default()
        }));
        let extractor = extractor(Some(Arc::new(backend)), None);
        let facts = extractor.extract("I think I booked twice?").await;
        assert!(facts.has_multiple_bookings());
    }

    #[tokio::test]
    async fn provider_fills_gaps_capped_at_medium() {
        let provider = FixedProvider(vec![ProviderBooking {
            booking_id: "PW-31337".to_string(),
            event_date: Some("2026-09-12".to_string()),
            amount: Some(25.0),
            location: Some("Dock Street Lot".to_string()),
        }]);
        let extractor = extractor(None, Some(Arc::new(provider)));
        let facts = extractor
            .extract("please cancel, reach me at jane@example.com")
            .await;
        assert_eq!(facts.booking_id.as_deref(), Some("PW-31337"));
        assert!(facts.has_minimum_fields());
        assert!(facts.confidence <= Confidence::Medium);
    }

    #[tokio::test]
    async fn provider_with_several_bookings_escalates() {
        let provider = FixedProvider(vec![
            ProviderBooking {
                booking_id: "PW-1".to_string(),
                event_date: None,
                amount: None,
                location: None,
            },
            ProviderBooking {
                booking_id: "PW-2".to_string(),
                event_date: None,
                amount: None,
                location: None,
            },
        ]);
        let extractor = extractor(None, Some(Arc::new(provider)));
        let facts = extractor
            .extract("cancel my parking, email jane@example.com")
            .await;
        assert!(facts.has_multiple_bookings());
        assert!(facts.booking_id.is_none());
    }

    #[tokio::test]
    async fn empty_text_is_empty_facts() {
        let extractor = extractor(None, None);
        let facts = extractor.extract("  ").await;
        assert_eq!(facts.extraction_method, ExtractionMethod::None);
    }
}
