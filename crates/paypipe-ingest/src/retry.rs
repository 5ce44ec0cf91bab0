//! Bounded retry with exponential backoff and jitter

use paypipe_common::config::RetrySettings;
use paypipe_common::{PipelineError, Result};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_ratio: f64,
}

impl RetryPolicy {
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            jitter_ratio: settings.jitter_ratio,
        }
    }

    /// Backoff before re-attempt number `attempt + 1`, without jitter.
    ///
    /// `base * 2^(attempt-1)`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn jittered(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        let jitter = delay.mul_f64(self.jitter_ratio * rand::random::<f64>());
        delay + jitter
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&paypipe_common::config::Settings::default().retry)
    }
}

/// Counters owned by the caller so they survive both success and failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetryStats {
    /// Re-attempts actually scheduled
    pub retries: u32,
    /// Operations that exhausted every attempt
    pub failures: u32,
}

/// Run `op` until it succeeds, fails with a non-retryable error, or runs out
/// of attempts.
///
/// Cancellation is observed before every attempt and during backoff sleeps.
pub async fn retry_call<T, F, Fut, P>(
    policy: &RetryPolicy,
    stats: &mut RetryStats,
    cancel: &CancellationToken,
    is_retryable: P,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&PipelineError) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) if attempt >= max_attempts => {
                stats.failures += 1;
                warn!(attempts = attempt, error = %e, "Retries exhausted");
                return Err(e);
            }
            Err(e) => {
                let delay = policy.jittered(attempt);
                stats.retries += 1;
                warn!(
                    "Attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt, max_attempts, e, delay
                );
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Retry backoff interrupted by cancellation");
                        return Err(PipelineError::Cancelled);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(300),
            max_delay: Duration::from_millis(5000),
            jitter_ratio: 0.2,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = policy(4);
        assert_eq!(p.backoff(1), Duration::from_millis(300));
        assert_eq!(p.backoff(2), Duration::from_millis(600));
        assert_eq!(p.backoff(3), Duration::from_millis(1200));
        assert_eq!(p.backoff(6), Duration::from_millis(5000));
        assert_eq!(p.backoff(200), Duration::from_millis(5000));
    }

    #[test]
    fn test_jitter_is_bounded() {
        let p = policy(4);
        for _ in 0..50 {
            let d = p.jittered(2);
            assert!(d >= Duration::from_millis(600));
            assert!(d <= Duration::from_millis(720));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let mut stats = RetryStats::default();

        let value = retry_call(
            &policy(4),
            &mut stats,
            &CancellationToken::new(),
            PipelineError::is_transient,
            || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(PipelineError::TransientIo(format!("attempt {n}")))
                } else {
                    Ok("done")
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(value, "done");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(stats, RetryStats { retries: 2, failures: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_counts_one_failure() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let mut stats = RetryStats::default();

        let err = retry_call(
            &policy(3),
            &mut stats,
            &CancellationToken::new(),
            PipelineError::is_transient,
            || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(PipelineError::TransientIo("down".into()))
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PipelineError::TransientIo(_)));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(stats, RetryStats { retries: 2, failures: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_propagates_immediately() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let mut stats = RetryStats::default();

        let err = retry_call(
            &policy(4),
            &mut stats,
            &CancellationToken::new(),
            PipelineError::is_transient,
            || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(PipelineError::Upstream {
                    status: 400,
                    message: "bad request".into(),
                })
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PipelineError::Upstream { status: 400, .. }));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(stats, RetryStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut stats = RetryStats::default();

        let err = retry_call(
            &policy(4),
            &mut stats,
            &cancel,
            PipelineError::is_transient,
            || async { Ok::<_, PipelineError>(1) },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled));
    }
}
