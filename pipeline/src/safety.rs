//! Content safety scanning at the pipeline entry.
//!
//! Ticket text is scanned for prompt injection, jailbreak attempts, and
//! similar threats before any of it reaches a generative stage. The
//! scanner's verdict has three states: safe, flagged with the offending
//! categories, or indeterminate when the scan itself failed. Flagged
//! and indeterminate content never reaches extraction or analysis.

use async_trait::async_trait;
use refund_triage_core::CallPolicy;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{instrument, warn};

/// Verdict of a content safety scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// No threat detected.
    Safe,
    /// Threats detected; contains the flagged category names.
    Flagged(Vec<String>),
    /// The scan could not be completed. Treated as unsafe downstream.
    Indeterminate(String),
}

/// Scans ticket content before it reaches generative stages.
#[async_trait]
pub trait ContentSafetyScanner: Send + Sync {
    /// Scan `content`. Empty content is trivially safe.
    ///
    /// Implementations never return an error; scan failure is the
    /// [`ScanOutcome::Indeterminate`] state so the orchestrator can
    /// escalate rather than abort.
    async fn scan(&self, content: &str) -> ScanOutcome;
}

#[derive(Debug, Deserialize)]
struct ScanResponse {
    #[serde(default)]
    results: Vec<ScanResult>,
}

#[derive(Debug, Deserialize)]
struct ScanResult {
    #[serde(default)]
    flagged: bool,
    #[serde(default)]
    categories: serde_json::Map<String, serde_json::Value>,
}

/// HTTP scanner against a Lakera-style prompt-injection API.
///
/// Bearer-authenticated POST with the content as `input`; the response
/// carries per-category flags.
pub struct HttpSafetyScanner {
    client: Client,
    api_url: String,
    api_key: String,
    policy: CallPolicy,
}

impl HttpSafetyScanner {
    /// Create a scanner for the given endpoint.
    #[must_use]
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, policy: CallPolicy) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into(),
            api_key: api_key.into(),
            policy,
        }
    }

    async fn scan_once(&self, content: &str) -> Result<ScanOutcome, String> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "input": content }))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("scan API returned status {}", response.status()));
        }

        let parsed: ScanResponse = response.json().await.map_err(|e| e.to_string())?;
        let Some(result) = parsed.results.first() else {
            return Err("scan API returned no results".to_string());
        };

        if result.flagged {
            let categories = result
                .categories
                .iter()
                .filter(|(_, v)| v.as_bool() == Some(true))
                .map(|(k, _)| k.clone())
                .collect();
            Ok(ScanOutcome::Flagged(categories))
        } else {
            Ok(ScanOutcome::Safe)
        }
    }
}

#[async_trait]
impl ContentSafetyScanner for HttpSafetyScanner {
    #[instrument(skip_all)]
    async fn scan(&self, content: &str) -> ScanOutcome {
        if content.trim().is_empty() {
            return ScanOutcome::Safe;
        }

        let result = self
            .policy
            .execute(|| "scan timed out".to_string(), || self.scan_once(content))
            .await;

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "content safety scan failed");
                ScanOutcome::Indeterminate(e)
            }
        }
    }
}
