//! Core types for the refund triage pipeline.
//!
//! This crate defines the data model shared by every pipeline stage:
//! inbound events, extracted booking facts, rule and analysis verdicts,
//! the terminal [`Decision`] artifact, the error taxonomy, and the
//! externalized policy configuration.
//!
//! All types here are plain data. No I/O happens in this crate; the
//! pipeline stages that produce and consume these types live in
//! `refund-triage-pipeline`.

pub mod config;
pub mod decision;
pub mod error;
pub mod event;
pub mod facts;
pub mod retry;
pub mod verdict;

pub use config::PolicyConfig;
pub use decision::{CancellationReason, Decision, DecisionMethod, FinalDecision};
pub use error::TriageError;
pub use event::InboundEvent;
pub use facts::{BookingFacts, BookingType, Confidence, ExtractionMethod, MissingField};
pub use retry::{CallPolicy, RetryPolicy};
pub use verdict::{AnalysisVerdict, PolicyRule, RuleDecision, RuleVerdict};
