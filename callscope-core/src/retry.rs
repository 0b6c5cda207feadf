//! Retry policy for transient external failures.
//!
//! One reusable policy object instead of ad-hoc sleeps at call sites:
//! max attempts, exponential backoff with a cap, and an allowlist of
//! retryable errors.

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Retry policy with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first (1 = no retries)
    pub max_attempts: usize,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Backoff cap
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
        }
    }

    /// Policy used for telephony page fetches.
    pub fn telephony(max_attempts: usize) -> Self {
        Self::new(
            max_attempts,
            Duration::from_millis(500),
            Duration::from_secs(30),
        )
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Run `op`, retrying transient failures with exponential backoff.
    ///
    /// Non-retryable errors fail immediately.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = self.initial_delay;
        let mut last_error: Option<Error> = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                tracing::debug!(
                    attempt = attempt + 1,
                    max_attempts = self.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, self.max_delay);
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if is_retryable_error(&e) {
                        tracing::warn!(error = %e, "Transient error");
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Telephony("max retries exceeded".to_string())))
    }
}

/// Check if an error is retryable (transient).
pub fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Telephony(msg) | Error::Transcription(msg) | Error::Llm(msg) => {
            // Retry on 5xx errors
            msg.contains("50") && (msg.contains("API error") || msg.contains("HTTP"))
                // Retry on network/timeout errors
                || msg.contains("timeout")
                || msg.contains("timed out")
                || msg.contains("connection")
                || msg.contains("request failed")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_is_retryable_error() {
        assert!(is_retryable_error(&Error::Telephony(
            "API error (500): internal error".to_string()
        )));
        assert!(is_retryable_error(&Error::Telephony(
            "HTTP request failed: timeout".to_string()
        )));
        assert!(!is_retryable_error(&Error::Telephony(
            "API error (400): bad request".to_string()
        )));
        assert!(!is_retryable_error(&Error::Telephony(
            "API error (401): unauthorized".to_string()
        )));
        assert!(!is_retryable_error(&Error::Config("missing key".to_string())));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(4));
        let attempts = AtomicUsize::new(0);

        let result = policy
            .run(|| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(Error::Telephony("HTTP request failed: timeout".to_string()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(4));
        let attempts = AtomicUsize::new(0);

        let result: Result<()> = policy
            .run(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::Telephony("API error (401): unauthorized".to_string())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_returns_last_error() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2));

        let result: Result<()> = policy
            .run(|| async { Err(Error::Telephony("HTTP request failed: timeout".to_string())) })
            .await;

        match result {
            Err(Error::Telephony(msg)) => assert!(msg.contains("timeout")),
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }
}
