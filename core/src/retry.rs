//! Retry policies and timeout handling for external calls.
//!
//! One configurable policy object, injected into every external call
//! site. Connectors do not carry their own ad-hoc retry loops.

use std::future::Future;
use std::time::Duration;

/// Retry policy for an external call.
#[derive(Debug, Clone)]
pub enum RetryPolicy {
    /// No retry - fail immediately on error.
    None,

    /// Fixed retry with constant delay.
    Fixed {
        /// Number of attempts (including the initial attempt).
        attempts: u32,
        /// Delay between attempts.
        delay: Duration,
    },

    /// Exponential backoff: `initial_delay * multiplier^attempt`.
    Exponential {
        /// Number of attempts (including the initial attempt).
        attempts: u32,
        /// Initial delay.
        initial_delay: Duration,
        /// Multiplier for exponential growth (typically 2.0).
        multiplier: f64,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::None
    }
}

impl RetryPolicy {
    /// Total number of attempts this policy allows.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Fixed { attempts, .. } | Self::Exponential { attempts, .. } => *attempts,
        }
    }

    /// Delay before the given retry (0-based retry index).
    #[must_use]
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed { delay, .. } => *delay,
            Self::Exponential {
                initial_delay,
                multiplier,
                ..
            } => initial_delay.mul_f64(multiplier.powi(retry.try_into().unwrap_or(i32::MAX))),
        }
    }
}

/// Combined retry policy and per-attempt timeout for one call site.
#[derive(Debug, Clone)]
pub struct CallPolicy {
    /// Retry policy.
    pub retry: RetryPolicy,
    /// Maximum execution time for a single attempt.
    pub timeout: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl CallPolicy {
    /// Policy with no retry and the given timeout.
    #[must_use]
    pub const fn no_retry(timeout: Duration) -> Self {
        Self {
            retry: RetryPolicy::None,
            timeout,
        }
    }

    /// Policy with fixed retry.
    #[must_use]
    pub const fn fixed_retry(attempts: u32, delay: Duration, timeout: Duration) -> Self {
        Self {
            retry: RetryPolicy::Fixed { attempts, delay },
            timeout,
        }
    }

    /// Execute an operation under this policy.
    ///
    /// Each attempt is given `self.timeout`; a timed-out attempt counts
    /// as a failure and may be retried per the retry policy. The last
    /// error is returned once attempts are exhausted.
    ///
    /// # Errors
    ///
    /// Returns the mapped timeout error when an attempt exceeds the
    /// deadline, or the operation's own error from the final attempt.
    pub async fn execute<T, E, F, Fut>(&self, on_timeout: impl Fn() -> E, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.retry.attempts().max(1);
        let mut last_err: Option<E> = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(self.retry.delay_before_retry(attempt - 1)).await;
            }

            match tokio::time::timeout(self.timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => last_err = Some(err),
                Err(_) => last_err = Some(on_timeout()),
            }
        }

        // attempts >= 1, so last_err is always set by the loop
        match last_err {
            Some(err) => Err(err),
            None => Err(on_timeout()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn success_on_first_attempt() {
        let policy = CallPolicy::no_retry(Duration::from_secs(1));
        let result: Result<u32, String> =
            policy.execute(|| "timeout".to_string(), || async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn no_retry_fails_immediately() {
        let calls = AtomicU32::new(0);
        let policy = CallPolicy::no_retry(Duration::from_secs(1));
        let result: Result<u32, String> = policy
            .execute(
                || "timeout".to_string(),
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("boom".to_string()) }
                },
            )
            .await;
        assert_eq!(result, Err("boom".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fixed_retry_recovers() {
        let calls = AtomicU32::new(0);
        let policy = CallPolicy::fixed_retry(3, Duration::from_millis(1), Duration::from_secs(1));
        let result: Result<u32, String> = policy
            .execute(
                || "timeout".to_string(),
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err("transient".to_string())
                        } else {
                            Ok(9)
                        }
                    }
                },
            )
            .await;
        assert_eq!(result, Ok(9));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn timeout_is_mapped() {
        let policy = CallPolicy::no_retry(Duration::from_millis(10));
        let result: Result<u32, String> = policy
            .execute(
                || "timed out".to_string(),
                || async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(1)
                },
            )
            .await;
        assert_eq!(result, Err("timed out".to_string()));
    }

    #[test]
    fn exponential_delays_grow() {
        let policy = RetryPolicy::Exponential {
            attempts: 3,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_before_retry(0), Duration::from_millis(100));
        assert_eq!(policy.delay_before_retry(1), Duration::from_millis(200));
    }
}
