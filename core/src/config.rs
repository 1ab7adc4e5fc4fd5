//! Policy configuration for the triage pipeline.
//!
//! Business constants and operational limits are externalized here
//! rather than embedded in stage code. Each component takes the parts
//! it needs through its constructor; there are no process-wide mutable
//! singletons.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    /// Configuration validation failed.
    ValidationError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationError(msg) => write!(f, "Configuration validation failed: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Externalized policy constants and operational limits.
///
/// Defaults preserve behavioral parity with the production policy:
/// $50 auto-approval threshold and a 14-day refund window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Maximum amount (USD) the rule engine may auto-approve for
    /// oversold / closed-location / accessibility scenarios. Larger
    /// amounts escalate to the analyzer instead.
    pub auto_approve_threshold: f64,
    /// Refund window in days used for policy text shown to the
    /// analyzer.
    pub refund_window_days: u32,
    /// Hard ceiling on one analyzer backend call.
    pub analyzer_timeout: Duration,
    /// Hard ceiling on one generative-extraction backend call.
    pub extraction_timeout: Duration,
    /// Sliding dedupe window for the admission gate.
    pub dedupe_window: Duration,
    /// Token-bucket capacity per event source.
    pub rate_limit_capacity: usize,
    /// Token refill rate per second per event source.
    pub rate_limit_refill_per_sec: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            auto_approve_threshold: 50.0,
            refund_window_days: 14,
            analyzer_timeout: Duration::from_secs(10),
            extraction_timeout: Duration::from_secs(10),
            dedupe_window: Duration::from_secs(300),
            rate_limit_capacity: 60,
            rate_limit_refill_per_sec: 1.0,
        }
    }
}

impl PolicyConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if any limit is
    /// non-positive or a timeout exceeds the 10-second design ceiling.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auto_approve_threshold <= 0.0 {
            return Err(ConfigError::ValidationError(
                "auto_approve_threshold must be > 0".to_string(),
            ));
        }
        if self.refund_window_days == 0 {
            return Err(ConfigError::ValidationError(
                "refund_window_days must be > 0".to_string(),
            ));
        }
        if self.analyzer_timeout > Duration::from_secs(10) {
            return Err(ConfigError::ValidationError(
                "analyzer_timeout must not exceed 10 seconds".to_string(),
            ));
        }
        if self.extraction_timeout > Duration::from_secs(10) {
            return Err(ConfigError::ValidationError(
                "extraction_timeout must not exceed 10 seconds".to_string(),
            ));
        }
        if self.rate_limit_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "rate_limit_capacity must be > 0".to_string(),
            ));
        }
        if self.rate_limit_refill_per_sec <= 0.0 {
            return Err(ConfigError::ValidationError(
                "rate_limit_refill_per_sec must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(PolicyConfig::default().validate().is_ok());
    }

    #[test]
    fn defaults_preserve_policy_constants() {
        let config = PolicyConfig::default();
        assert!((config.auto_approve_threshold - 50.0).abs() < f64::EPSILON);
        assert_eq!(config.refund_window_days, 14);
    }

    #[test]
    fn rejects_oversized_analyzer_timeout() {
        let config = PolicyConfig {
            analyzer_timeout: Duration::from_secs(30),
            ..PolicyConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_rate_limit() {
        let config = PolicyConfig {
            rate_limit_capacity: 0,
            ..PolicyConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
