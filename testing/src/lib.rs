//! Testing utilities for the refund triage pipeline.
//!
//! This crate provides:
//! - Stub implementations of the pipeline's stage traits
//! - Fixture builders for tickets, facts, and verdicts
//! - A pre-wired pipeline assembly for integration tests
//!
//! # Example
//!
//! ```
//! use refund_triage_testing::{fixtures, stubs};
//!
//! #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let pipeline = fixtures::pipeline(
//!     stubs::StubScanner::safe(),
//!     stubs::StubAnalyzer::approving("goodwill exception"),
//! );
//! let decision = pipeline.decide(&fixtures::ticket("42", "please refund PW-1")).await;
//! # let _ = decision;
//! # }
//! ```

pub mod stubs {
    //! Stub stage implementations with fixed, inspectable behavior.

    use async_trait::async_trait;
    use refund_triage_core::{
        AnalysisVerdict, BookingFacts, Confidence, Decision, FinalDecision, RuleVerdict,
    };
    use refund_triage_pipeline::{
        Analyzer, ConnectorError, ContentSafetyScanner, ExtractionBackend, GenerativeExtraction,
        ProviderBooking, ScanOutcome, TicketContext, TicketingConnector,
    };
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Safety scanner returning a fixed outcome.
    pub struct StubScanner {
        outcome: ScanOutcome,
    }

    impl StubScanner {
        /// Scanner that finds everything safe.
        #[must_use]
        pub fn safe() -> Self {
            Self {
                outcome: ScanOutcome::Safe,
            }
        }

        /// Scanner that flags everything with the given categories.
        #[must_use]
        pub fn flagging(categories: &[&str]) -> Self {
            Self {
                outcome: ScanOutcome::Flagged(
                    categories.iter().map(ToString::to_string).collect(),
                ),
            }
        }

        /// Scanner whose scan always fails.
        #[must_use]
        pub fn unavailable(cause: &str) -> Self {
            Self {
                outcome: ScanOutcome::Indeterminate(cause.to_string()),
            }
        }
    }

    #[async_trait]
    impl ContentSafetyScanner for StubScanner {
        async fn scan(&self, _content: &str) -> ScanOutcome {
            self.outcome.clone()
        }
    }

    /// Analyzer returning a fixed verdict and counting invocations.
    pub struct StubAnalyzer {
        verdict: AnalysisVerdict,
        calls: AtomicUsize,
    }

    impl StubAnalyzer {
        /// Analyzer returning the given verdict.
        #[must_use]
        pub fn returning(verdict: AnalysisVerdict) -> Self {
            Self {
                verdict,
                calls: AtomicUsize::new(0),
            }
        }

        /// Analyzer that approves with medium confidence.
        #[must_use]
        pub fn approving(reasoning: &str) -> Self {
            Self::returning(AnalysisVerdict {
                decision: FinalDecision::Approved,
                confidence: Confidence::Medium,
                policy_reference: "Analyst Judgment".to_string(),
                reasoning: reasoning.to_string(),
                key_factors: Vec::new(),
                latency_ms: 5,
                fallback: false,
            })
        }

        /// Analyzer that escalates with low confidence.
        #[must_use]
        pub fn escalating(reasoning: &str) -> Self {
            Self::returning(AnalysisVerdict {
                decision: FinalDecision::NeedsHumanReview,
                confidence: Confidence::Low,
                policy_reference: "Analyst Judgment".to_string(),
                reasoning: reasoning.to_string(),
                key_factors: Vec::new(),
                latency_ms: 5,
                fallback: false,
            })
        }

        /// Analyzer whose backend always fails, exercising the
        /// rule-verdict fallback path.
        #[must_use]
        pub fn failing(cause: &str) -> FailingAnalyzer {
            FailingAnalyzer {
                cause: cause.to_string(),
                calls: AtomicUsize::new(0),
            }
        }

        /// Number of times `analyze` was called.
        #[must_use]
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Analyzer for StubAnalyzer {
        async fn analyze(
            &self,
            _ticket: &TicketContext,
            _facts: &BookingFacts,
            _rule_hint: Option<&RuleVerdict>,
        ) -> AnalysisVerdict {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.verdict.clone()
        }
    }

    /// Analyzer that always falls back to the rule verdict.
    pub struct FailingAnalyzer {
        cause: String,
        calls: AtomicUsize,
    }

    impl FailingAnalyzer {
        /// Number of times `analyze` was called.
        #[must_use]
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Analyzer for FailingAnalyzer {
        async fn analyze(
            &self,
            _ticket: &TicketContext,
            _facts: &BookingFacts,
            rule_hint: Option<&RuleVerdict>,
        ) -> AnalysisVerdict {
            self.calls.fetch_add(1, Ordering::SeqCst);
            refund_triage_pipeline::analyzer::fallback_verdict(
                &self.cause,
                rule_hint,
                Duration::from_millis(1),
            )
        }
    }

    /// Extraction backend returning a fixed result.
    pub struct StubExtractionBackend {
        result: Result<GenerativeExtraction, String>,
    }

    impl StubExtractionBackend {
        /// Backend returning the given extraction.
        #[must_use]
        pub fn returning(extraction: GenerativeExtraction) -> Self {
            Self {
                result: Ok(extraction),
            }
        }

        /// Backend that always fails.
        #[must_use]
        pub fn failing(cause: &str) -> Self {
            Self {
                result: Err(cause.to_string()),
            }
        }
    }

    #[async_trait]
    impl ExtractionBackend for StubExtractionBackend {
        async fn extract(
            &self,
            _ticket_text: &str,
            _timeout: Duration,
        ) -> Result<GenerativeExtraction, String> {
            self.result.clone()
        }
    }

    /// Ticketing connector serving one fixed ticket and capturing
    /// posted decisions.
    pub struct StubTicketing {
        ticket: TicketContext,
        posted: Mutex<Vec<Decision>>,
    }

    impl StubTicketing {
        /// Connector serving the given ticket.
        #[must_use]
        pub fn serving(ticket: TicketContext) -> Self {
            Self {
                ticket,
                posted: Mutex::new(Vec::new()),
            }
        }

        /// Decisions posted back so far.
        #[must_use]
        pub fn posted(&self) -> Vec<Decision> {
            self.posted.lock().map(|p| p.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl TicketingConnector for StubTicketing {
        async fn fetch_ticket(&self, ticket_id: &str) -> Result<TicketContext, ConnectorError> {
            if ticket_id == self.ticket.ticket_id {
                Ok(self.ticket.clone())
            } else {
                Err(ConnectorError::NotFound(format!("ticket {ticket_id}")))
            }
        }

        async fn post_decision(
            &self,
            _ticket_id: &str,
            decision: &Decision,
        ) -> Result<(), ConnectorError> {
            if let Ok(mut posted) = self.posted.lock() {
                posted.push(decision.clone());
            }
            Ok(())
        }
    }

    /// Booking provider serving a fixed booking list.
    pub struct StubBookingProvider {
        bookings: Vec<ProviderBooking>,
    }

    impl StubBookingProvider {
        /// Provider serving the given bookings for any email.
        #[must_use]
        pub fn serving(bookings: Vec<ProviderBooking>) -> Self {
            Self { bookings }
        }
    }

    #[async_trait]
    impl refund_triage_pipeline::BookingProvider for StubBookingProvider {
        async fn lookup_bookings(
            &self,
            _email: &str,
        ) -> Result<Vec<ProviderBooking>, ConnectorError> {
            Ok(self.bookings.clone())
        }
    }
}

pub mod fixtures {
    //! Fixture builders for tickets, facts, and pipeline assemblies.

    use crate::stubs;
    use chrono::{NaiveDate, TimeZone, Utc};
    use refund_triage_core::{
        BookingFacts, BookingType, Confidence, ExtractionMethod, PolicyConfig,
    };
    use refund_triage_pipeline::{
        Analyzer, BookingExtractor, ContentSafetyScanner, InMemoryAuditSink, RuleEngine,
        TicketContext, TriagePipeline,
    };
    use std::collections::BTreeSet;
    use std::sync::Arc;

    /// A fixed receipt time so timing assertions are deterministic.
    #[must_use]
    pub fn received_at() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 20, 12, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// A ticket with the given id and description, received at the
    /// fixed fixture time.
    #[must_use]
    pub fn ticket(ticket_id: &str, description: &str) -> TicketContext {
        TicketContext {
            ticket_id: ticket_id.to_string(),
            subject: "Refund request".to_string(),
            description: description.to_string(),
            notes: Vec::new(),
            received_at: received_at(),
        }
    }

    /// Complete booking facts for a confirmed booking.
    #[must_use]
    pub fn complete_facts(event_date: &str, amount: f64) -> BookingFacts {
        BookingFacts {
            booking_id: Some("PW-12345".to_string()),
            event_date: NaiveDate::parse_from_str(event_date, "%Y-%m-%d").ok(),
            reservation_date: None,
            booking_type: BookingType::Confirmed,
            amount: Some(amount),
            location: Some("Main Street Garage".to_string()),
            customer_email: Some("jane@example.com".to_string()),
            extraction_method: ExtractionMethod::Pattern,
            confidence: Confidence::High,
            missing_fields: BTreeSet::new(),
        }
    }

    /// A pipeline wired with the given scanner and analyzer, pattern
    /// extraction only, and a fresh in-memory audit sink.
    #[must_use]
    pub fn pipeline(
        scanner: impl ContentSafetyScanner + 'static,
        analyzer: impl Analyzer + 'static,
    ) -> TriagePipeline {
        pipeline_with_audit(scanner, analyzer, Arc::new(InMemoryAuditSink::new()))
    }

    /// Same as [`pipeline`] but sharing a caller-provided audit sink so
    /// tests can inspect the trail.
    #[must_use]
    pub fn pipeline_with_audit(
        scanner: impl ContentSafetyScanner + 'static,
        analyzer: impl Analyzer + 'static,
        audit: Arc<InMemoryAuditSink>,
    ) -> TriagePipeline {
        let config = PolicyConfig::default();
        TriagePipeline::new(
            Arc::new(scanner),
            BookingExtractor::new(&config, None, None),
            RuleEngine::new(config),
            Arc::new(analyzer),
            audit,
        )
    }

    /// Shorthand for a safe-scanner pipeline with a failing analyzer,
    /// the assembly most escalation tests want.
    #[must_use]
    pub fn fallback_pipeline() -> TriagePipeline {
        pipeline(
            stubs::StubScanner::safe(),
            stubs::StubAnalyzer::failing("backend unavailable"),
        )
    }
}
