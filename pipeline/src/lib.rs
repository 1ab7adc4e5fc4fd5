//! Refund-ticket triage pipeline.
//!
//! Turns inbound ticketing events into auditable refund decisions:
//!
//! 1. **Admission** - relevance filter, dedupe window, per-source rate
//!    limit.
//! 2. **Safety** - content scan before any text reaches a generative
//!    stage.
//! 3. **Extraction** - pattern tier first, generative fallback second.
//! 4. **Rules** - pure, deterministic policy evaluation.
//! 5. **Analysis** - generative judgment for uncertain cases only, with
//!    an explicit rule-verdict fallback.
//! 6. **Decision** - synthesis, cancellation-reason mapping, write-once
//!    audit summary.
//!
//! The pipeline is total: every run produces a valid
//! [`refund_triage_core::Decision`], degrading to `needs_human_review`
//! instead of erroring out.
//!
//! # Example
//!
//! ```no_run
//! use refund_triage_core::PolicyConfig;
//! use refund_triage_gemini::GeminiClient;
//! use refund_triage_pipeline::{
//!     AuditSink, BookingExtractor, GeminiAnalyzer, GeminiExtractionBackend, HttpSafetyScanner,
//!     InMemoryAuditSink, RuleEngine, TriagePipeline,
//! };
//! use refund_triage_core::CallPolicy;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PolicyConfig::default();
//! let gemini = GeminiClient::from_env()?;
//!
//! let pipeline = TriagePipeline::new(
//!     Arc::new(HttpSafetyScanner::new(
//!         "https://api.lakera.ai/v1/prompt_injection",
//!         std::env::var("LAKERA_API_KEY")?,
//!         CallPolicy::fixed_retry(2, Duration::from_secs(1), Duration::from_secs(10)),
//!     )),
//!     BookingExtractor::new(
//!         &config,
//!         Some(Arc::new(GeminiExtractionBackend::new(gemini.clone()))),
//!         None,
//!     ),
//!     RuleEngine::new(config.clone()),
//!     Arc::new(GeminiAnalyzer::new(gemini, &config)),
//!     Arc::new(InMemoryAuditSink::new()),
//! );
//! # Ok(())
//! # }
//! ```

pub mod admission;
pub mod analyzer;
pub mod audit;
pub mod connectors;
pub mod extract;
pub mod orchestrator;
pub mod reason;
pub mod rules;
pub mod safety;
pub mod service;

pub use admission::{Admission, AdmissionGate, DedupeStore, InMemoryDedupeStore, RateLimiter};
pub use analyzer::{Analyzer, GeminiAnalyzer};
pub use audit::{AuditError, AuditRecord, AuditSink, AuditStatus, AuditStep, InMemoryAuditSink};
pub use connectors::{
    BookingProvider, ConnectorError, FreshdeskConnector, ProviderBooking, TicketContext,
    TicketingConnector,
};
pub use extract::{BookingExtractor, ExtractionBackend, GeminiExtractionBackend, GenerativeExtraction};
pub use orchestrator::TriagePipeline;
pub use reason::{reason_for_rule, reason_from_text};
pub use rules::RuleEngine;
pub use safety::{ContentSafetyScanner, HttpSafetyScanner, ScanOutcome};
pub use service::{ServiceOutcome, TriageService};
