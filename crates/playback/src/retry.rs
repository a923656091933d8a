// Retry-with-backoff for manifest and segment fetches: exponential growth,
// hard delay cap, optional jitter to spread concurrent retriers.

use std::future::Future;
use std::time::Duration;

use rand::RngExt;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::PlaybackError;

#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles each attempt.
    pub base_delay: Duration,
    /// Upper bound on any computed delay.
    pub max_delay: Duration,
    /// Add up to half a base delay of random noise per retry.
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        // Checked shift so a large attempt count saturates instead of wrapping.
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let grown = self
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay);
        let capped = grown.min(self.max_delay);

        if !self.jitter {
            return capped;
        }

        let span_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX) / 2;
        let headroom_ms =
            u64::try_from(self.max_delay.saturating_sub(capped).as_millis()).unwrap_or(0);
        let limit_ms = span_ms.min(headroom_ms);
        if limit_ms == 0 {
            return capped;
        }

        let noise = Duration::from_millis(rand::rng().random_range(0..limit_ms));
        (capped + noise).min(self.max_delay)
    }
}

/// What a single attempt decided: done, worth another try, or hopeless.
pub enum RetryOutcome<T> {
    Success(T),
    Retry(PlaybackError),
    Fail(PlaybackError),
}

/// Run `attempt` until it succeeds, fails permanently, exhausts the policy,
/// or the token is cancelled. The closure receives the 0-indexed attempt
/// number.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &BackoffPolicy,
    token: &CancellationToken,
    attempt: F,
) -> Result<T, PlaybackError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = RetryOutcome<T>>,
{
    for n in 0..=policy.max_retries {
        if token.is_cancelled() {
            return Err(PlaybackError::Cancelled);
        }

        match attempt(n).await {
            RetryOutcome::Success(value) => return Ok(value),
            RetryOutcome::Fail(err) => return Err(err),
            RetryOutcome::Retry(err) => {
                if n >= policy.max_retries {
                    return Err(err);
                }
                let delay = policy.delay(n);
                warn!(
                    attempt = n + 1,
                    max = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient error"
                );
                tokio::select! {
                    _ = token.cancelled() => return Err(PlaybackError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    Err(PlaybackError::internal("retry loop exited without result"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> BackoffPolicy {
        BackoffPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_secs(1),
            jitter: false,
        }
    }

    #[test]
    fn delay_doubles_then_caps() {
        let p = BackoffPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            jitter: false,
        };
        assert_eq!(p.delay(0), Duration::from_millis(200));
        assert_eq!(p.delay(1), Duration::from_millis(400));
        assert_eq!(p.delay(2), Duration::from_millis(800));
        assert_eq!(p.delay(8), Duration::from_secs(2));
        // Far past the shift width must still be capped, not wrap.
        assert_eq!(p.delay(40), Duration::from_secs(2));
    }

    #[test]
    fn jitter_never_exceeds_cap() {
        let p = BackoffPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(400),
            max_delay: Duration::from_secs(1),
            jitter: true,
        };
        for _ in 0..64 {
            assert!(p.delay(6) <= Duration::from_secs(1));
        }
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let token = CancellationToken::new();
        let out = retry_with_backoff(&policy(3), &token, |_| async {
            RetryOutcome::Success(7u32)
        })
        .await;
        assert_eq!(out.unwrap(), 7);
    }

    #[tokio::test]
    async fn permanent_failure_stops_immediately() {
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let out: Result<(), _> = retry_with_backoff(&policy(3), &token, |_| {
            calls.fetch_add(1, Ordering::Relaxed);
            async {
                RetryOutcome::Fail(PlaybackError::SegmentFetch {
                    reason: "HTTP 404".to_owned(),
                    retryable: false,
                })
            }
        })
        .await;
        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn retries_then_gives_up() {
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let out: Result<(), _> = retry_with_backoff(&policy(2), &token, |_| {
            calls.fetch_add(1, Ordering::Relaxed);
            async {
                RetryOutcome::Retry(PlaybackError::SegmentFetch {
                    reason: "HTTP 503".to_owned(),
                    retryable: true,
                })
            }
        })
        .await;
        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn recovers_on_later_attempt() {
        let token = CancellationToken::new();
        let out = retry_with_backoff(&policy(3), &token, |n| async move {
            if n < 2 {
                RetryOutcome::Retry(PlaybackError::SegmentFetch {
                    reason: "timeout".to_owned(),
                    retryable: true,
                })
            } else {
                RetryOutcome::Success(n)
            }
        })
        .await;
        assert_eq!(out.unwrap(), 2);
    }

    #[tokio::test]
    async fn cancellation_wins() {
        let token = CancellationToken::new();
        token.cancel();
        let out: Result<u32, _> = retry_with_backoff(&policy(3), &token, |_| async {
            RetryOutcome::Success(1u32)
        })
        .await;
        assert!(matches!(out, Err(PlaybackError::Cancelled)));
    }
}
