//! Decision orchestration.
//!
//! One finite stage sequence per run:
//! `safety → extract → rules → (analyze?) → synthesize → audit`.
//! Every stage is total, so the pipeline never throws out to the
//! caller; failures surface as `needs_human_review` decisions. Re-runs
//! with a known `run_id` replay the sealed decision instead of
//! processing again.

use crate::analyzer::Analyzer;
use crate::audit::{AuditError, AuditSink, AuditStatus, AuditStep};
use crate::connectors::TicketContext;
use crate::extract::BookingExtractor;
use crate::reason;
use crate::rules::RuleEngine;
use crate::safety::{ContentSafetyScanner, ScanOutcome};
use chrono::Utc;
use refund_triage_core::{
    BookingFacts, Confidence, Decision, DecisionMethod, FinalDecision, RuleDecision, RuleVerdict,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// The triage pipeline.
pub struct TriagePipeline {
    scanner: Arc<dyn ContentSafetyScanner>,
    extractor: BookingExtractor,
    rules: RuleEngine,
    analyzer: Arc<dyn Analyzer>,
    audit: Arc<dyn AuditSink>,
}

impl TriagePipeline {
    /// Assemble a pipeline from its stages.
    #[must_use]
    pub fn new(
        scanner: Arc<dyn ContentSafetyScanner>,
        extractor: BookingExtractor,
        rules: RuleEngine,
        analyzer: Arc<dyn Analyzer>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            scanner,
            extractor,
            rules,
            analyzer,
            audit,
        }
    }

    /// Decide one ticket under a fresh run id.
    pub async fn decide(&self, ticket: &TicketContext) -> Decision {
        self.decide_with_run_id(ticket, Uuid::new_v4()).await
    }

    /// Decide one ticket under the given run id.
    ///
    /// Idempotent per run id: if a decision was already sealed for this
    /// run, it is replayed without re-processing or double-emitting
    /// audit records.
    #[instrument(skip_all, fields(ticket_id = %ticket.ticket_id, %run_id))]
    pub async fn decide_with_run_id(&self, ticket: &TicketContext, run_id: Uuid) -> Decision {
        if let Some(sealed) = self.audit.summary_for_run(run_id).await {
            info!("replaying sealed decision");
            return sealed;
        }

        let started = Instant::now();
        let decision = self.run_stages(ticket, run_id, started).await;

        if let Err(e) = decision.validate() {
            // A violation here is a programming defect; surface it as an
            // escalation rather than sealing a malformed decision.
            error!(error = %e, "decision failed invariant validation");
            debug_assert!(false, "decision invariant violated: {e}");
            let repaired = error_decision(ticket, run_id, &e.to_string(), started);
            return self.seal(repaired).await;
        }

        self.seal(decision).await
    }

    async fn run_stages(
        &self,
        ticket: &TicketContext,
        run_id: Uuid,
        started: Instant,
    ) -> Decision {
        let text = ticket.full_text();

        // Safety gate. Flagged or unverifiable content never reaches a
        // generative stage.
        match self.scanner.scan(&text).await {
            ScanOutcome::Safe => {
                self.record(run_id, AuditStep::Safety, AuditStatus::Ok, json!({}))
                    .await;
            }
            ScanOutcome::Flagged(categories) => {
                self.record(
                    run_id,
                    AuditStep::Safety,
                    AuditStatus::Failed,
                    json!({ "categories": categories }),
                )
                .await;
                return Decision {
                    run_id,
                    ticket_id: ticket.ticket_id.clone(),
                    final_decision: FinalDecision::NeedsHumanReview,
                    method: DecisionMethod::Rules,
                    confidence: Confidence::High,
                    reasoning: format!(
                        "content flagged by safety scan ({}); manual review required",
                        categories.join(", ")
                    ),
                    policy_reference: "Content Safety".to_string(),
                    cancellation_reason: None,
                    processing_time_ms: elapsed_ms(started),
                    created_at: Utc::now(),
                };
            }
            ScanOutcome::Indeterminate(cause) => {
                self.record(
                    run_id,
                    AuditStep::Safety,
                    AuditStatus::Failed,
                    json!({ "error": cause }),
                )
                .await;
                return error_decision(
                    ticket,
                    run_id,
                    &format!("content safety scan unavailable: {cause}"),
                    started,
                );
            }
        }

        // Extraction is total; a failed run shows up as empty facts.
        let facts = self.extractor.extract(&text).await;
        let extraction_status = if facts.has_minimum_fields() {
            AuditStatus::Ok
        } else {
            AuditStatus::Failed
        };
        self.record(
            run_id,
            AuditStep::Extraction,
            extraction_status,
            json!({
                "method": facts.extraction_method,
                "confidence": facts.confidence,
                "missing_fields": facts.missing_fields,
            }),
        )
        .await;

        let verdict = self.rules.evaluate(&facts, &text, ticket.received_at);
        self.record(
            run_id,
            AuditStep::Rules,
            AuditStatus::Ok,
            json!({
                "decision": verdict.decision,
                "policy_rule": verdict.policy_rule,
                "confidence": verdict.confidence,
                "reasoning": verdict.reasoning,
            }),
        )
        .await;

        let decision = if verdict.is_conclusive() {
            // Conclusive rules skip the generative stage entirely.
            self.record(run_id, AuditStep::Analysis, AuditStatus::Skipped, json!({}))
                .await;
            decision_from_rules(ticket, run_id, &verdict, started)
        } else {
            let analysis = self.analyzer.analyze(ticket, &facts, Some(&verdict)).await;
            let status = if analysis.fallback {
                AuditStatus::Fallback
            } else {
                AuditStatus::Ok
            };
            self.record(
                run_id,
                AuditStep::Analysis,
                status,
                json!({
                    "decision": analysis.decision,
                    "confidence": analysis.confidence,
                    "fallback": analysis.fallback,
                    "latency_ms": analysis.latency_ms,
                }),
            )
            .await;

            let method = if analysis.fallback {
                DecisionMethod::Fallback
            } else {
                DecisionMethod::Llm
            };
            let cancellation_reason = (analysis.decision == FinalDecision::Approved).then(|| {
                if analysis.fallback {
                    reason::reason_for_rule(verdict.policy_rule)
                } else {
                    reason::reason_from_text(&analysis.reasoning, &analysis.policy_reference)
                }
            });

            Decision {
                run_id,
                ticket_id: ticket.ticket_id.clone(),
                final_decision: analysis.decision,
                method,
                confidence: analysis.confidence,
                reasoning: analysis.reasoning,
                policy_reference: analysis.policy_reference,
                cancellation_reason,
                processing_time_ms: elapsed_ms(started),
                created_at: Utc::now(),
            }
        };

        apply_confidence_floor(decision, &facts)
    }

    /// Record the terminal audit step and write the run summary. A
    /// concurrent run that sealed first wins; its decision is replayed.
    async fn seal(&self, decision: Decision) -> Decision {
        self.record(
            decision.run_id,
            AuditStep::Decision,
            AuditStatus::Ok,
            json!({
                "final_decision": decision.final_decision,
                "method": decision.method,
                "confidence": decision.confidence,
            }),
        )
        .await;

        match self.audit.summarize(&decision).await {
            Ok(()) => {}
            Err(AuditError::AlreadySummarized(run_id)) => {
                if let Some(sealed) = self.audit.summary_for_run(run_id).await {
                    return sealed;
                }
            }
            Err(e) => warn!(error = %e, "failed to write decision summary"),
        }

        info!(
            final_decision = %decision.final_decision,
            method = %decision.method,
            confidence = %decision.confidence,
            processing_time_ms = decision.processing_time_ms,
            "decision sealed"
        );
        decision
    }

    async fn record(
        &self,
        run_id: Uuid,
        step: AuditStep,
        status: AuditStatus,
        details: serde_json::Value,
    ) {
        if let Err(e) = self.audit.record(run_id, step, status, details).await {
            // The audit sink must not be able to take the pipeline down.
            warn!(%run_id, %step, error = %e, "failed to append audit record");
        }
    }
}

fn decision_from_rules(
    ticket: &TicketContext,
    run_id: Uuid,
    verdict: &RuleVerdict,
    started: Instant,
) -> Decision {
    let final_decision = match verdict.decision {
        RuleDecision::Approved => FinalDecision::Approved,
        RuleDecision::Denied => FinalDecision::Denied,
        // Unreachable for conclusive verdicts; mapped to the escalation
        // outcome all the same.
        RuleDecision::Uncertain => FinalDecision::NeedsHumanReview,
    };
    let cancellation_reason = (final_decision == FinalDecision::Approved)
        .then(|| reason::reason_for_rule(verdict.policy_rule));

    Decision {
        run_id,
        ticket_id: ticket.ticket_id.clone(),
        final_decision,
        method: DecisionMethod::Rules,
        confidence: verdict.confidence,
        reasoning: verdict.reasoning.clone(),
        policy_reference: verdict.policy_rule.to_string(),
        cancellation_reason,
        processing_time_ms: elapsed_ms(started),
        created_at: Utc::now(),
    }
}

fn error_decision(ticket: &TicketContext, run_id: Uuid, cause: &str, started: Instant) -> Decision {
    Decision {
        run_id,
        ticket_id: ticket.ticket_id.clone(),
        final_decision: FinalDecision::NeedsHumanReview,
        method: DecisionMethod::Error,
        confidence: Confidence::Low,
        reasoning: format!("processing error: {cause}"),
        policy_reference: "Processing Error".to_string(),
        cancellation_reason: None,
        processing_time_ms: elapsed_ms(started),
        created_at: Utc::now(),
    }
}

/// Confidence floor: an auto-decision built on incomplete facts and low
/// confidence is not safe to act on; escalate it instead.
fn apply_confidence_floor(mut decision: Decision, facts: &BookingFacts) -> Decision {
    if decision.final_decision != FinalDecision::NeedsHumanReview
        && decision.confidence == Confidence::Low
        && !facts.has_minimum_fields()
    {
        decision.reasoning = format!(
            "{} [escalated: low confidence with incomplete booking facts]",
            decision.reasoning
        );
        decision.final_decision = FinalDecision::NeedsHumanReview;
        decision.cancellation_reason = None;
    }
    decision
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use refund_triage_core::{CancellationReason, ExtractionMethod};
    use std::collections::BTreeSet;

    fn low_confidence_decision(final_decision: FinalDecision) -> Decision {
        Decision {
            run_id: Uuid::new_v4(),
            ticket_id: "42".to_string(),
            final_decision,
            method: DecisionMethod::Fallback,
            confidence: Confidence::Low,
            reasoning: "uncertain".to_string(),
            policy_reference: "Edge Case".to_string(),
            cancellation_reason: (final_decision == FinalDecision::Approved)
                .then_some(CancellationReason::Other),
            processing_time_ms: 1,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn floor_escalates_low_confidence_on_incomplete_facts() {
        let facts = BookingFacts::empty();
        let escalated =
            apply_confidence_floor(low_confidence_decision(FinalDecision::Approved), &facts);
        assert_eq!(escalated.final_decision, FinalDecision::NeedsHumanReview);
        assert_eq!(escalated.cancellation_reason, None);
        assert!(escalated.validate().is_ok());
    }

    #[test]
    fn floor_leaves_complete_facts_alone() {
        let facts = BookingFacts {
            booking_id: Some("PW-1".to_string()),
            event_date: chrono::NaiveDate::from_ymd_opt(2026, 9, 1),
            reservation_date: None,
            booking_type: refund_triage_core::BookingType::Confirmed,
            amount: Some(10.0),
            location: None,
            customer_email: None,
            extraction_method: ExtractionMethod::Pattern,
            confidence: Confidence::High,
            missing_fields: BTreeSet::new(),
        };
        let decision =
            apply_confidence_floor(low_confidence_decision(FinalDecision::Denied), &facts);
        assert_eq!(decision.final_decision, FinalDecision::Denied);
    }
}
