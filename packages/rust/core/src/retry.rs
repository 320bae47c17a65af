//! Bounded exponential-backoff retry around one external call.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use taxrates_shared::{Result, RetryPolicy, TaxRatesError};

/// Retries transient failures of an operation according to a [`RetryPolicy`].
///
/// `max_retries` counts total attempts. The delay before attempt `n` (from 2)
/// is `base_delay * 2^(n-2)`; nothing is slept after the final attempt.
/// Errors that are not transient end the loop immediately and are returned
/// as they are, so callers can tell them apart from
/// [`TaxRatesError::RetriesExhausted`].
#[derive(Debug, Clone, Copy)]
pub struct RetryingInvoker {
    policy: RetryPolicy,
}

impl RetryingInvoker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Delay slept before 1-based `attempt`. Zero for the first attempt.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 2).unwrap_or(u32::MAX);
        self.policy.base_delay.saturating_mul(factor)
    }

    /// Run `op` until it succeeds, fails terminally, or attempts run out.
    /// `op` receives the 1-based attempt number.
    pub async fn invoke<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.policy.max_retries.max(1);
        let mut last = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                let delay = self.delay_before(attempt);
                debug!(label, attempt, delay_ms = delay.as_millis() as u64, "backing off");
                tokio::time::sleep(delay).await;
            }

            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    warn!(label, attempt, attempts, error = %e, "transient failure");
                    last = Some(e);
                }
                Err(e) => {
                    debug!(label, attempt, error = %e, "non-retryable failure");
                    return Err(e);
                }
            }
        }

        Err(TaxRatesError::RetriesExhausted {
            attempts,
            last: Box::new(last.unwrap_or_else(|| TaxRatesError::Network(label.to_string()))),
        })
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;

    fn invoker(max_retries: u32) -> RetryingInvoker {
        RetryingInvoker::new(RetryPolicy {
            max_retries,
            base_delay: Duration::from_secs(1),
        })
    }

    fn server_error() -> TaxRatesError {
        TaxRatesError::upstream(500, "boom")
    }

    #[test]
    fn backoff_schedule() {
        let inv = invoker(5);
        assert_eq!(inv.delay_before(1), Duration::ZERO);
        assert_eq!(inv.delay_before(2), Duration::from_secs(1));
        assert_eq!(inv.delay_before(3), Duration::from_secs(2));
        assert_eq!(inv.delay_before(4), Duration::from_secs(4));
        assert_eq!(inv.delay_before(40), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let start = Instant::now();
        let mut calls = 0;
        let result = invoker(3)
            .invoke("test", |_| {
                calls += 1;
                let n = calls;
                async move { if n < 3 { Err(server_error()) } else { Ok(n) } }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        let elapsed = start.elapsed();
        // Two retries: 1 + 2 units, short of a further 4-unit retry.
        assert!(elapsed >= Duration::from_secs(3), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(7), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_and_reports_attempts() {
        let start = Instant::now();
        let mut calls = 0u32;
        let err = invoker(3)
            .invoke::<(), _, _>("test", |_| {
                calls += 1;
                async { Err(server_error()) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls, 3);
        match err {
            TaxRatesError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, TaxRatesError::Upstream { status: 500, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        // No sleep after the final attempt.
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_failure_is_not_retried() {
        let mut calls = 0u32;
        let err = invoker(3)
            .invoke::<(), _, _>("test", |_| {
                calls += 1;
                async { Err(TaxRatesError::upstream(400, "bad request")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls, 1);
        assert!(matches!(err, TaxRatesError::Upstream { status: 400, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_are_retried() {
        let mut calls = 0u32;
        let result = invoker(2)
            .invoke("test", |attempt| {
                calls += 1;
                async move {
                    if attempt == 1 {
                        Err(TaxRatesError::Timeout("slow".into()))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls, 2);
    }
}
