//! Append-only audit trail for pipeline runs.
//!
//! The step log holds at most one record per run and step, so a run can
//! be reconstructed from it alone even when two runs race on one run
//! id. The per-run decision summary is a projection for fast querying,
//! written once at pipeline exit; the step log stays authoritative.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use refund_triage_core::Decision;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Pipeline stage an audit record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStep {
    /// Admission gate (relevance, dedupe, rate limit).
    Admission,
    /// Content safety scan.
    Safety,
    /// Booking-fact extraction.
    Extraction,
    /// Rule evaluation.
    Rules,
    /// Generative analysis.
    Analysis,
    /// Decision synthesis and sealing.
    Decision,
}

impl fmt::Display for AuditStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admission => write!(f, "admission"),
            Self::Safety => write!(f, "safety"),
            Self::Extraction => write!(f, "extraction"),
            Self::Rules => write!(f, "rules"),
            Self::Analysis => write!(f, "analysis"),
            Self::Decision => write!(f, "decision"),
        }
    }
}

/// Outcome of a stage invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// Stage completed normally.
    Ok,
    /// Stage failed; the run degraded or escalated.
    Failed,
    /// Stage did not run (e.g. analysis skipped for conclusive rules).
    Skipped,
    /// Stage degraded to its fallback path.
    Fallback,
}

/// One append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Record identity.
    pub id: Uuid,
    /// Run this record belongs to.
    pub run_id: Uuid,
    /// Stage that emitted the record.
    pub step: AuditStep,
    /// Stage outcome.
    pub status: AuditStatus,
    /// Stage-specific details.
    pub details: serde_json::Value,
    /// When the record was written.
    pub timestamp: DateTime<Utc>,
}

/// Audit sink errors.
#[derive(Debug, Error)]
pub enum AuditError {
    /// A summary already exists for this run. Summaries are write-once.
    #[error("Run {0} already has a decision summary")]
    AlreadySummarized(Uuid),

    /// The sink's backing store failed.
    #[error("Audit store failure: {0}")]
    StoreFailure(String),
}

/// Append-only audit sink. Safe for concurrent writers.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one step record. Never updates or deletes. Write-once
    /// per `(run_id, step)`: the first record for a step wins and
    /// later writes for the same step are ignored, so a replayed run
    /// cannot double-emit its trail.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::StoreFailure`] when the record could not
    /// be persisted.
    async fn record(
        &self,
        run_id: Uuid,
        step: AuditStep,
        status: AuditStatus,
        details: serde_json::Value,
    ) -> Result<(), AuditError>;

    /// Write the run's decision summary. Write-once per run id: the
    /// first summary wins and later attempts fail.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::AlreadySummarized`] when a summary exists.
    async fn summarize(&self, decision: &Decision) -> Result<(), AuditError>;

    /// All step records for a run, in insertion order.
    async fn records_for_run(&self, run_id: Uuid) -> Vec<AuditRecord>;

    /// The run's decision summary, if sealed.
    async fn summary_for_run(&self, run_id: Uuid) -> Option<Decision>;
}

/// In-memory audit sink.
#[derive(Default)]
pub struct InMemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
    summaries: RwLock<HashMap<Uuid, Decision>>,
}

impl InMemoryAuditSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(
        &self,
        run_id: Uuid,
        step: AuditStep,
        status: AuditStatus,
        details: serde_json::Value,
    ) -> Result<(), AuditError> {
        let mut records = self.records.write().await;
        // First write per (run, step) wins.
        if records.iter().any(|r| r.run_id == run_id && r.step == step) {
            return Ok(());
        }
        records.push(AuditRecord {
            id: Uuid::new_v4(),
            run_id,
            step,
            status,
            details,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn summarize(&self, decision: &Decision) -> Result<(), AuditError> {
        let mut summaries = self.summaries.write().await;
        if summaries.contains_key(&decision.run_id) {
            return Err(AuditError::AlreadySummarized(decision.run_id));
        }
        summaries.insert(decision.run_id, decision.clone());
        Ok(())
    }

    async fn records_for_run(&self, run_id: Uuid) -> Vec<AuditRecord> {
        let records = self.records.read().await;
        records.iter().filter(|r| r.run_id == run_id).cloned().collect()
    }

    async fn summary_for_run(&self, run_id: Uuid) -> Option<Decision> {
        let summaries = self.summaries.read().await;
        summaries.get(&run_id).cloned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use refund_triage_core::{Confidence, DecisionMethod, FinalDecision};
    use serde_json::json;

    fn decision(run_id: Uuid) -> Decision {
        Decision {
            run_id,
            ticket_id: "42".to_string(),
            final_decision: FinalDecision::Denied,
            method: DecisionMethod::Rules,
            confidence: Confidence::High,
            reasoning: "post-event cancellation, no exception applies".to_string(),
            policy_reference: "Post-Event Cancellation".to_string(),
            cancellation_reason: None,
            processing_time_ms: 3,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn records_are_appended_per_run() {
        let sink = InMemoryAuditSink::new();
        let run_a = Uuid::new_v4();
        let run_b = Uuid::new_v4();

        sink.record(run_a, AuditStep::Extraction, AuditStatus::Ok, json!({}))
            .await
            .unwrap();
        sink.record(run_a, AuditStep::Rules, AuditStatus::Ok, json!({}))
            .await
            .unwrap();
        sink.record(run_b, AuditStep::Extraction, AuditStatus::Failed, json!({}))
            .await
            .unwrap();

        let records = sink.records_for_run(run_a).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].step, AuditStep::Extraction);
        assert_eq!(records[1].step, AuditStep::Rules);
    }

    #[tokio::test]
    async fn summary_is_write_once() {
        let sink = InMemoryAuditSink::new();
        let run_id = Uuid::new_v4();
        let d = decision(run_id);

        sink.summarize(&d).await.unwrap();
        let err = sink.summarize(&d).await.unwrap_err();
        assert!(matches!(err, AuditError::AlreadySummarized(id) if id == run_id));

        let replay = sink.summary_for_run(run_id).await.unwrap();
        assert_eq!(replay.ticket_id, "42");
    }

    #[tokio::test]
    async fn step_records_are_write_once_per_run() {
        let sink = InMemoryAuditSink::new();
        let run_id = Uuid::new_v4();

        sink.record(run_id, AuditStep::Rules, AuditStatus::Ok, json!({"pass": 1}))
            .await
            .unwrap();
        sink.record(run_id, AuditStep::Rules, AuditStatus::Failed, json!({"pass": 2}))
            .await
            .unwrap();

        let records = sink.records_for_run(run_id).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, AuditStatus::Ok);
        assert_eq!(records[0].details, json!({"pass": 1}));
    }

    #[tokio::test]
    async fn concurrent_writers_keep_one_record_per_step() {
        let sink = std::sync::Arc::new(InMemoryAuditSink::new());
        let run_id = Uuid::new_v4();
        let steps = [
            AuditStep::Safety,
            AuditStep::Extraction,
            AuditStep::Rules,
            AuditStep::Analysis,
            AuditStep::Decision,
        ];

        let mut handles = Vec::new();
        for _ in 0..16 {
            let sink = std::sync::Arc::clone(&sink);
            handles.push(tokio::spawn(async move {
                for step in steps {
                    sink.record(run_id, step, AuditStatus::Ok, json!({})).await?;
                }
                Ok::<(), AuditError>(())
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Sixteen racing writers, one record per step.
        assert_eq!(sink.records_for_run(run_id).await.len(), steps.len());
    }
}
