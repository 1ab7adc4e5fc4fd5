//! Error taxonomy for the triage pipeline.

use thiserror::Error;

/// Failure categories for pipeline stages.
///
/// Stage-local failures are caught and downgraded to degraded verdicts;
/// only [`TriageError::InvariantViolation`] halts processing. Policy
/// indeterminacy is not an error; it surfaces as a
/// needs-human-review decision.
#[derive(Debug, Error)]
pub enum TriageError {
    /// Network failure or timeout on an external connector. Retried at
    /// the caller's discretion, never internally beyond one fallback.
    #[error("transient external failure: {0}")]
    TransientExternal(String),

    /// The generative backend returned output that does not match the
    /// requested schema. Triggers fallback, not surfaced as fatal.
    #[error("malformed backend response: {0}")]
    MalformedResponse(String),

    /// A programming defect, e.g. an approved decision with no
    /// cancellation reason. Must fail loudly, never silently patched.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_category() {
        let err = TriageError::TransientExternal("connection reset".to_string());
        assert!(err.to_string().contains("transient external failure"));
    }
}
