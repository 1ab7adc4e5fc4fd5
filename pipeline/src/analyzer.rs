//! Generative analyzer for cases the rule engine could not settle.
//!
//! The analyzer is total: timeouts, malformed responses, and backend
//! failures all degrade to an explicit fallback verdict that reuses the
//! rule engine's hint verbatim. Fallback is an expected degraded path
//! and is logged at WARN, not ERROR.

use crate::connectors::TicketContext;
use crate::rules::RuleEngine;
use async_trait::async_trait;
use refund_triage_core::{
    AnalysisVerdict, BookingFacts, Confidence, FinalDecision, PolicyConfig, RuleDecision,
    RuleVerdict,
};
use refund_triage_gemini::GeminiClient;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Ticket descriptions are truncated to keep the prompt bounded; a
/// thousand characters carries the relevant complaint.
const MAX_DESCRIPTION_CHARS: usize = 1000;

/// Policy excerpt given to the analyzer alongside the case facts.
const POLICY_EXCERPT: &str = "\
1. Pre-arrival cancellations (before the event start date) are refundable regardless of amount.
2. On-demand and third-party bookings are non-refundable; season packages are non-refundable \
unless the charge is a duplicate.
3. Duplicate bookings, confirmed re-books, and customers forced to pay again on-site are \
refundable.
4. Oversold, closed, or inaccessible locations are refundable; small amounts are auto-approved, \
larger ones require judgment.
5. Post-event cancellations with no recognized exception are denied.
6. When information is missing or the case is ambiguous, escalate to human review.";

/// Judgment stage for uncertain cases.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyze one case. Always produces a verdict; failures surface as
    /// an explicit fallback, never as an error.
    async fn analyze(
        &self,
        ticket: &TicketContext,
        facts: &BookingFacts,
        rule_hint: Option<&RuleVerdict>,
    ) -> AnalysisVerdict;
}

#[derive(Debug, Deserialize)]
struct AnalysisResponse {
    decision: String,
    reasoning: String,
    #[serde(default)]
    policy_applied: String,
    #[serde(default)]
    confidence: String,
    #[serde(default)]
    key_factors: Vec<String>,
}

/// Gemini-backed analyzer.
pub struct GeminiAnalyzer {
    client: GeminiClient,
    timeout: Duration,
}

impl GeminiAnalyzer {
    /// Build an analyzer from policy configuration.
    #[must_use]
    pub fn new(client: GeminiClient, config: &PolicyConfig) -> Self {
        Self {
            client,
            timeout: config.analyzer_timeout,
        }
    }

    fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "decision": {
                    "type": "string",
                    "enum": ["approved", "denied", "needs_human_review"]
                },
                "reasoning": { "type": "string" },
                "policy_applied": { "type": "string" },
                "confidence": {
                    "type": "string",
                    "enum": ["high", "medium", "low"]
                },
                "key_factors": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            },
            "required": ["decision", "reasoning", "policy_applied", "confidence", "key_factors"]
        })
    }

    fn prompt(
        ticket: &TicketContext,
        facts: &BookingFacts,
        rule_hint: Option<&RuleVerdict>,
    ) -> String {
        let description: String = ticket.description.chars().take(MAX_DESCRIPTION_CHARS).collect();

        let mut booking_lines = Vec::new();
        if let Some(id) = &facts.booking_id {
            booking_lines.push(format!("- Booking ID: {id}"));
        }
        if let Some(amount) = facts.amount {
            booking_lines.push(format!("- Amount: ${amount:.2}"));
        }
        if let Some(date) = facts.event_date {
            booking_lines.push(format!("- Event Date: {date}"));
        }
        if let Some(date) = facts.reservation_date {
            booking_lines.push(format!("- Reservation Date: {date}"));
        }
        booking_lines.push(format!("- Booking Type: {}", facts.booking_type));
        if let Some(location) = &facts.location {
            booking_lines.push(format!("- Location: {location}"));
        }
        let booking_summary = if booking_lines.is_empty() {
            "No booking information available".to_string()
        } else {
            booking_lines.join("\n")
        };

        let rule_context = rule_hint.map_or(String::new(), |hint| {
            format!(
                "\n# RULE-BASED ANALYSIS\n\n\
                 - Decision: {}\n- Reasoning: {}\n- Policy Rule: {}\n- Confidence: {}\n\n\
                 The rule-based system was uncertain about this case, so your analysis is needed.\n",
                hint.decision, hint.reasoning, hint.policy_rule, hint.confidence
            )
        });

        format!(
            "You are a refund policy expert analyzing a parking refund request. \
             Make a fair, policy-compliant decision based on the information provided.\n\n\
             # REFUND POLICY\n\n{POLICY_EXCERPT}\n\n\
             # TICKET INFORMATION\n\n\
             - Ticket ID: {}\n- Subject: {}\n- Description: {description}\n\n\
             # BOOKING INFORMATION\n\n{booking_summary}\n{rule_context}\n\
             # YOUR TASK\n\n\
             Decision options: approved (clear policy support), denied (clear policy \
             violation), needs_human_review (ambiguous, missing information, or judgment call).\n\
             Confidence levels: high (clear-cut), medium (some ambiguity), low (borderline or \
             missing critical information).\n\
             Escalate to human review when uncertain. Reference the specific policy in your \
             reasoning and list the key factors that influenced your decision.\n\n\
             Provide your analysis as a JSON object with the required fields.",
            ticket.ticket_id, ticket.subject
        )
    }
}

#[async_trait]
impl Analyzer for GeminiAnalyzer {
    #[instrument(skip_all, fields(ticket_id = %ticket.ticket_id))]
    async fn analyze(
        &self,
        ticket: &TicketContext,
        facts: &BookingFacts,
        rule_hint: Option<&RuleVerdict>,
    ) -> AnalysisVerdict {
        let prompt = Self::prompt(ticket, facts, rule_hint);
        let started = Instant::now();

        let value = match self.client.infer(&prompt, Self::schema(), self.timeout).await {
            Ok(value) => value,
            Err(e) => {
                return fallback_verdict(&e.to_string(), rule_hint, started.elapsed());
            }
        };

        let response: AnalysisResponse = match serde_json::from_value(value) {
            Ok(response) => response,
            Err(e) => {
                return fallback_verdict(
                    &format!("unparseable analysis response: {e}"),
                    rule_hint,
                    started.elapsed(),
                );
            }
        };

        // Anything outside the canonical decision set is a malformed
        // response, not a decision.
        let Some(decision) = parse_decision(&response.decision) else {
            return fallback_verdict(
                &format!("invalid decision value: {}", response.decision),
                rule_hint,
                started.elapsed(),
            );
        };

        let confidence = parse_confidence(&response.confidence).unwrap_or_else(|| {
            warn!(raw = %response.confidence, "invalid confidence value, defaulting to medium");
            Confidence::Medium
        });

        let latency_ms = elapsed_ms(started.elapsed());
        info!(
            decision = %decision,
            confidence = %confidence,
            latency_ms,
            "analysis complete"
        );

        AnalysisVerdict {
            decision,
            confidence,
            policy_reference: response.policy_applied,
            reasoning: response.reasoning,
            key_factors: response.key_factors,
            latency_ms,
            fallback: false,
        }
    }
}

/// Build the fallback verdict from the rule hint.
///
/// The rule verdict is reused verbatim (an uncertain hint maps to human
/// review); without a hint the only safe outcome is escalation.
#[must_use]
pub fn fallback_verdict(
    reason: &str,
    rule_hint: Option<&RuleVerdict>,
    elapsed: Duration,
) -> AnalysisVerdict {
    warn!(reason, "analyzer unavailable, falling back to rule verdict");

    let edge_case = RuleEngine::edge_case();
    let hint = rule_hint.unwrap_or(&edge_case);
    let decision = match hint.decision {
        RuleDecision::Approved => FinalDecision::Approved,
        RuleDecision::Denied => FinalDecision::Denied,
        RuleDecision::Uncertain => FinalDecision::NeedsHumanReview,
    };

    AnalysisVerdict {
        decision,
        confidence: hint.confidence,
        policy_reference: hint.policy_rule.to_string(),
        reasoning: format!("{} (analysis unavailable: {reason})", hint.reasoning),
        key_factors: Vec::new(),
        latency_ms: elapsed_ms(elapsed),
        fallback: true,
    }
}

fn parse_decision(raw: &str) -> Option<FinalDecision> {
    match raw.to_lowercase().as_str() {
        "approved" => Some(FinalDecision::Approved),
        "denied" => Some(FinalDecision::Denied),
        "needs_human_review" | "needs human review" => Some(FinalDecision::NeedsHumanReview),
        _ => None,
    }
}

fn parse_confidence(raw: &str) -> Option<Confidence> {
    match raw.to_lowercase().as_str() {
        "high" => Some(Confidence::High),
        "medium" => Some(Confidence::Medium),
        "low" => Some(Confidence::Low),
        _ => None,
    }
}

fn elapsed_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use chrono::Utc;
    use refund_triage_core::{Confidence, PolicyRule};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ticket() -> TicketContext {
        TicketContext {
            ticket_id: "42".to_string(),
            subject: "Refund request".to_string(),
            description: "The garage was closed when I arrived".to_string(),
            notes: Vec::new(),
            received_at: Utc::now(),
        }
    }

    fn uncertain_hint() -> RuleVerdict {
        RuleVerdict {
            decision: RuleDecision::Uncertain,
            policy_rule: PolicyRule::ClosedLocation,
            confidence: Confidence::Medium,
            reasoning: "amount exceeds the auto-approve threshold".to_string(),
        }
    }

    fn analyzer(uri: &str) -> GeminiAnalyzer {
        let client = GeminiClient::new("test-key".to_string()).with_api_url(uri.to_string());
        GeminiAnalyzer::new(client, &PolicyConfig::default())
    }

    fn model_response(body: &str) -> serde_json::Value {
        json!({
            "candidates": [{
                "content": { "parts": [{ "text": body }], "role": "model" }
            }]
        })
    }

    #[tokio::test]
    async fn parses_structured_analysis() {
        let server = MockServer::start().await;
        let body = json!({
            "decision": "approved",
            "reasoning": "Location closure is a recognized exception.",
            "policy_applied": "Closed Location",
            "confidence": "high",
            "key_factors": ["location closed", "timely claim"]
        })
        .to_string();
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(model_response(&body)))
            .mount(&server)
            .await;

        let verdict = analyzer(&server.uri())
            .analyze(&ticket(), &BookingFacts::empty(), Some(&uncertain_hint()))
            .await;
        assert_eq!(verdict.decision, FinalDecision::Approved);
        assert_eq!(verdict.confidence, Confidence::High);
        assert!(!verdict.fallback);
        assert_eq!(verdict.key_factors.len(), 2);
    }

    #[tokio::test]
    async fn invalid_decision_triggers_fallback() {
        let server = MockServer::start().await;
        let body = json!({
            "decision": "maybe",
            "reasoning": "unsure",
            "policy_applied": "",
            "confidence": "high",
            "key_factors": []
        })
        .to_string();
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(model_response(&body)))
            .mount(&server)
            .await;

        let hint = uncertain_hint();
        let verdict = analyzer(&server.uri())
            .analyze(&ticket(), &BookingFacts::empty(), Some(&hint))
            .await;
        assert!(verdict.fallback);
        assert_eq!(verdict.decision, FinalDecision::NeedsHumanReview);
        assert_eq!(verdict.confidence, hint.confidence);
        assert!(verdict.reasoning.contains(&hint.reasoning));
    }

    #[tokio::test]
    async fn invalid_confidence_defaults_to_medium() {
        let server = MockServer::start().await;
        let body = json!({
            "decision": "denied",
            "reasoning": "no exception applies",
            "policy_applied": "Post-Event Cancellation",
            "confidence": "certain",
            "key_factors": []
        })
        .to_string();
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(model_response(&body)))
            .mount(&server)
            .await;

        let verdict = analyzer(&server.uri())
            .analyze(&ticket(), &BookingFacts::empty(), Some(&uncertain_hint()))
            .await;
        assert!(!verdict.fallback);
        assert_eq!(verdict.confidence, Confidence::Medium);
    }

    #[tokio::test]
    async fn backend_failure_reuses_rule_hint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let hint = uncertain_hint();
        let verdict = analyzer(&server.uri())
            .analyze(&ticket(), &BookingFacts::empty(), Some(&hint))
            .await;
        assert!(verdict.fallback);
        assert_eq!(verdict.decision, FinalDecision::NeedsHumanReview);
        assert_eq!(verdict.policy_reference, hint.policy_rule.to_string());
    }

    #[test]
    fn fallback_without_hint_escalates() {
        let verdict = fallback_verdict("timeout", None, Duration::from_millis(10));
        assert_eq!(verdict.decision, FinalDecision::NeedsHumanReview);
        assert_eq!(verdict.confidence, Confidence::Low);
        assert!(verdict.fallback);
    }

    #[test]
    fn prompt_truncates_long_descriptions() {
        let mut long_ticket = ticket();
        long_ticket.description = "x".repeat(5000);
        let prompt = GeminiAnalyzer::prompt(&long_ticket, &BookingFacts::empty(), None);
        assert!(prompt.len() < 4000);
    }
}
