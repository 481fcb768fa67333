//! Retry Policy
//!
//! An explicit, caller-owned retry policy. Nothing in the crate retries
//! implicitly; an oracle is handed a `RetryPolicy` value at construction and
//! that value is the whole story. The final failure is always surfaced to the
//! caller, never swallowed.

use std::future::Future;
use std::time::Duration;

use crate::error::MeridianResult;
use crate::log_debug;

/// Bounded exponential backoff: attempt n sleeps base_delay * 2^(n-1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds or attempts are exhausted; returns the
    /// last error when they are
    pub async fn run<T, F, Fut>(&self, mut op: F) -> MeridianResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = MeridianResult<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut delay = self.base_delay;

        for attempt in 1..=attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt == attempts => return Err(err),
                Err(err) => {
                    log_debug!(
                        "oracle",
                        "attempt failed, backing off",
                        attempt = attempt,
                        delay_ms = delay.as_millis(),
                        error = err
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
            }
        }
        unreachable!("loop returns on the final attempt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MeridianError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_first_try_without_backoff() {
        let policy = RetryPolicy::none();
        let calls = AtomicU32::new(0);
        let result: MeridianResult<u32> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(7) }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        };
        let calls = AtomicU32::new(0);
        let result = policy
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(MeridianError::oracle("transient"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
        };
        let result: MeridianResult<()> = policy
            .run(|| async { Err(MeridianError::oracle("still down")) })
            .await;
        assert_eq!(result.unwrap_err().code, crate::error::ErrorCode::ExternalOracle);
    }
}
