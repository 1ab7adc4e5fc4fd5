//! Event-driven triage service.
//!
//! Glues the admission gate, the ticketing connector, and the pipeline
//! into the end-to-end flow a webhook handler drives: admit the event,
//! fetch the ticket, decide, and post the decision back as a private
//! note. Posting is best-effort; a note failure never un-decides a run.

use crate::admission::{Admission, AdmissionGate};
use crate::connectors::TicketingConnector;
use crate::orchestrator::TriagePipeline;
use refund_triage_core::event::InboundEvent;
use refund_triage_core::Decision;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Outcome of handling one inbound event.
#[derive(Debug)]
pub enum ServiceOutcome {
    /// Event was not refund-related; nothing happened.
    Ignored,
    /// Event was a redelivery inside the dedupe window.
    Duplicate,
    /// The source exceeded its rate budget; the caller may retry later.
    RateLimited,
    /// The ticket could not be fetched; no run was started.
    FetchFailed(String),
    /// A decision was made (and posted back, best-effort).
    Decided(Decision),
}

/// The service wiring events into pipeline runs.
pub struct TriageService {
    gate: AdmissionGate,
    ticketing: Arc<dyn TicketingConnector>,
    pipeline: Arc<TriagePipeline>,
}

impl TriageService {
    /// Assemble the service.
    #[must_use]
    pub fn new(
        gate: AdmissionGate,
        ticketing: Arc<dyn TicketingConnector>,
        pipeline: Arc<TriagePipeline>,
    ) -> Self {
        Self {
            gate,
            ticketing,
            pipeline,
        }
    }

    /// Handle one inbound ticket event from `source`.
    #[instrument(skip_all, fields(ticket_id = %event.ticket_id, source))]
    pub async fn handle_event(&self, event: &InboundEvent, source: &str) -> ServiceOutcome {
        match self.gate.admit(event, source).await {
            Admission::Accept => {}
            Admission::Ignored => return ServiceOutcome::Ignored,
            Admission::Duplicate => return ServiceOutcome::Duplicate,
            Admission::RateLimited => return ServiceOutcome::RateLimited,
        }

        let mut ticket = match self.ticketing.fetch_ticket(&event.ticket_id).await {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!(error = %e, "could not fetch ticket");
                return ServiceOutcome::FetchFailed(e.to_string());
            }
        };
        // Timing is computed against the event's receipt, not the
        // ticket's creation; a re-opened ticket is judged as of now.
        ticket.received_at = event.received_at;

        let decision = self.pipeline.decide(&ticket).await;

        if let Err(e) = self.ticketing.post_decision(&ticket.ticket_id, &decision).await {
            warn!(error = %e, "could not post decision note");
        }

        info!(final_decision = %decision.final_decision, "event handled");
        ServiceOutcome::Decided(decision)
    }
}
