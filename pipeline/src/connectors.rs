//! Connectors to the ticketing system and booking provider.
//!
//! The pipeline talks to the outside world through two traits:
//! [`TicketingConnector`] (fetch ticket context, post the decision back
//! as a private note) and [`BookingProvider`] (authoritative booking
//! lookup). HTTP implementations are Freshdesk-shaped and take an
//! injected [`CallPolicy`] so retry behavior lives in one place.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use refund_triage_core::{CallPolicy, Decision, FinalDecision};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors from connector calls.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// HTTP request failed.
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Response body could not be decoded.
    #[error("Response decoding failed: {0}")]
    DecodeFailed(String),

    /// A call attempt exceeded its deadline.
    #[error("Request timed out")]
    Timeout,

    /// Connector rejected the request (auth, validation).
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },
}

/// Everything the pipeline knows about a ticket when a run starts.
#[derive(Debug, Clone)]
pub struct TicketContext {
    /// Ticket identifier in the ticketing system.
    pub ticket_id: String,
    /// Ticket subject line.
    pub subject: String,
    /// Customer-facing description.
    pub description: String,
    /// Private notes, oldest first. Agents paste booking details here.
    pub notes: Vec<String>,
    /// When the triggering event was received.
    pub received_at: DateTime<Utc>,
}

impl TicketContext {
    /// All ticket text concatenated for extraction and rule matching.
    #[must_use]
    pub fn full_text(&self) -> String {
        let mut text = format!("Subject: {}\n\n{}", self.subject, self.description);
        for note in &self.notes {
            text.push_str("\n\n");
            text.push_str(note);
        }
        text
    }
}

/// Read and write access to the ticketing system.
#[async_trait]
pub trait TicketingConnector: Send + Sync {
    /// Fetch the ticket's subject, description, and private notes.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError`] on network failure, missing ticket,
    /// or undecodable response.
    async fn fetch_ticket(&self, ticket_id: &str) -> Result<TicketContext, ConnectorError>;

    /// Post the decision back to the ticket as a private note.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError`] when the note could not be created.
    async fn post_decision(&self, ticket_id: &str, decision: &Decision)
    -> Result<(), ConnectorError>;
}

/// A booking record from the booking provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderBooking {
    /// Provider booking identifier.
    pub booking_id: String,
    /// Event date in ISO format, if known.
    pub event_date: Option<String>,
    /// Amount paid in dollars.
    pub amount: Option<f64>,
    /// Location name.
    pub location: Option<String>,
}

/// Authoritative booking lookup, keyed by customer email.
#[async_trait]
pub trait BookingProvider: Send + Sync {
    /// Fetch bookings for a customer.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError`] when the provider is unreachable.
    async fn lookup_bookings(&self, email: &str) -> Result<Vec<ProviderBooking>, ConnectorError>;
}

#[derive(Debug, Deserialize)]
struct FreshdeskTicket {
    subject: Option<String>,
    description_text: Option<String>,
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    conversations: Vec<FreshdeskConversation>,
}

#[derive(Debug, Deserialize)]
struct FreshdeskConversation {
    body_text: Option<String>,
    #[serde(default)]
    private: bool,
}

/// Freshdesk REST connector.
///
/// Uses the `/api/v2/tickets/{id}?include=conversations` endpoint for
/// reads and `/api/v2/tickets/{id}/notes` for the decision note.
/// Authentication is HTTP basic with the API key as username.
pub struct FreshdeskConnector {
    client: Client,
    base_url: String,
    api_key: String,
    policy: CallPolicy,
}

impl FreshdeskConnector {
    /// Create a connector for the given Freshdesk domain.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, policy: CallPolicy) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            policy,
        }
    }
}

#[async_trait]
impl TicketingConnector for FreshdeskConnector {
    #[instrument(skip(self))]
    async fn fetch_ticket(&self, ticket_id: &str) -> Result<TicketContext, ConnectorError> {
        let url = format!(
            "{}/api/v2/tickets/{ticket_id}?include=conversations",
            self.base_url
        );

        let ticket: FreshdeskTicket = self
            .policy
            .execute(
                || ConnectorError::Timeout,
                || async {
                    let response = self
                        .client
                        .get(&url)
                        .basic_auth(&self.api_key, Some("X"))
                        .send()
                        .await
                        .map_err(|e| ConnectorError::RequestFailed(e.to_string()))?;

                    match response.status().as_u16() {
                        200 => response
                            .json::<FreshdeskTicket>()
                            .await
                            .map_err(|e| ConnectorError::DecodeFailed(e.to_string())),
                        404 => Err(ConnectorError::NotFound(format!("ticket {ticket_id}"))),
                        status => {
                            let message = response.text().await.unwrap_or_default();
                            Err(ConnectorError::ApiError { status, message })
                        }
                    }
                },
            )
            .await?;

        let notes = ticket
            .conversations
            .into_iter()
            .filter(|c| c.private)
            .filter_map(|c| c.body_text)
            .collect();

        Ok(TicketContext {
            ticket_id: ticket_id.to_string(),
            subject: ticket.subject.unwrap_or_default(),
            description: ticket.description_text.unwrap_or_default(),
            notes,
            received_at: ticket.created_at.unwrap_or_else(Utc::now),
        })
    }

    #[instrument(skip(self, decision))]
    async fn post_decision(
        &self,
        ticket_id: &str,
        decision: &Decision,
    ) -> Result<(), ConnectorError> {
        let url = format!("{}/api/v2/tickets/{ticket_id}/notes", self.base_url);
        let body = json!({
            "body": format_decision_note(decision),
            "private": true,
        });

        self.policy
            .execute(
                || ConnectorError::Timeout,
                || async {
                    let response = self
                        .client
                        .post(&url)
                        .basic_auth(&self.api_key, Some("X"))
                        .json(&body)
                        .send()
                        .await
                        .map_err(|e| ConnectorError::RequestFailed(e.to_string()))?;

                    if response.status().is_success() {
                        debug!(ticket_id, "posted decision note");
                        Ok(())
                    } else {
                        let status = response.status().as_u16();
                        let message = response.text().await.unwrap_or_default();
                        Err(ConnectorError::ApiError { status, message })
                    }
                },
            )
            .await
    }
}

/// HTML note body for the ticketing system.
///
/// Freshdesk renders notes as HTML; the layout mirrors what support
/// agents already expect from the automation.
#[must_use]
pub fn format_decision_note(decision: &Decision) -> String {
    let mut note = String::from("<h3>Automated Refund Analysis</h3>");
    note.push_str(&format!(
        "<p><strong>Decision:</strong> {}</p>",
        decision.final_decision
    ));
    note.push_str(&format!(
        "<p><strong>Analysis:</strong> {}</p>",
        decision.reasoning
    ));
    note.push_str(&format!(
        "<p><strong>Policy Applied:</strong> {}</p>",
        decision.policy_reference
    ));
    note.push_str(&format!(
        "<p><strong>Confidence:</strong> {}</p>",
        decision.confidence
    ));
    if decision.final_decision == FinalDecision::Approved {
        if let Some(reason) = decision.cancellation_reason {
            note.push_str(&format!(
                "<p><strong>Cancellation Reason:</strong> {reason}</p>"
            ));
        }
    }
    note.push_str(&format!(
        "<hr><p><em>Automated triage run {} ({})</em></p>",
        decision.run_id, decision.method
    ));
    note
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use refund_triage_core::{Confidence, DecisionMethod};
    use std::time::Duration;
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn approved_decision() -> Decision {
        Decision {
            run_id: Uuid::new_v4(),
            ticket_id: "42".to_string(),
            final_decision: FinalDecision::Approved,
            method: DecisionMethod::Rules,
            confidence: Confidence::High,
            reasoning: "Cancelled before the event date".to_string(),
            policy_reference: "Pre-Arrival".to_string(),
            cancellation_reason: Some(refund_triage_core::CancellationReason::PreArrival),
            processing_time_ms: 12,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn fetch_ticket_collects_private_notes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/tickets/42"))
            .and(query_param("include", "conversations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "subject": "Refund Request for Booking #12345",
                "description_text": "The customer is requesting a refund.",
                "created_at": "2026-08-20T10:00:00Z",
                "conversations": [
                    { "body_text": "Booking ID: PW-12345, Amount: $40.00", "private": true },
                    { "body_text": "Hi, any update?", "private": false }
                ]
            })))
            .mount(&server)
            .await;

        let connector = FreshdeskConnector::new(
            server.uri(),
            "key",
            CallPolicy::no_retry(Duration::from_secs(5)),
        );
        let ticket = connector.fetch_ticket("42").await.unwrap();
        assert_eq!(ticket.subject, "Refund Request for Booking #12345");
        assert_eq!(ticket.notes.len(), 1);
        assert!(ticket.full_text().contains("PW-12345"));
    }

    #[tokio::test]
    async fn fetch_missing_ticket_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let connector = FreshdeskConnector::new(
            server.uri(),
            "key",
            CallPolicy::no_retry(Duration::from_secs(5)),
        );
        let result = connector.fetch_ticket("9999").await;
        assert!(matches!(result, Err(ConnectorError::NotFound(_))));
    }

    #[tokio::test]
    async fn post_decision_sends_private_note() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/tickets/42/notes"))
            .and(body_partial_json(json!({ "private": true })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 1 })))
            .expect(1)
            .mount(&server)
            .await;

        let connector = FreshdeskConnector::new(
            server.uri(),
            "key",
            CallPolicy::no_retry(Duration::from_secs(5)),
        );
        connector
            .post_decision("42", &approved_decision())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn post_decision_retries_transient_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 2 })))
            .expect(1)
            .mount(&server)
            .await;

        let connector = FreshdeskConnector::new(
            server.uri(),
            "key",
            CallPolicy::fixed_retry(2, Duration::from_millis(1), Duration::from_secs(5)),
        );
        connector
            .post_decision("42", &approved_decision())
            .await
            .unwrap();
    }

    #[test]
    fn note_includes_cancellation_reason_only_when_approved() {
        let approved = approved_decision();
        let note = format_decision_note(&approved);
        assert!(note.contains("Cancellation Reason"));
        assert!(note.contains("Pre-arrival"));

        let denied = Decision {
            final_decision: FinalDecision::Denied,
            cancellation_reason: None,
            ..approved
        };
        assert!(!format_decision_note(&denied).contains("Cancellation Reason"));
    }
}
