//! The retry kernel.
//!
//! Wraps every external collaborator call with (a) a timeout, (b) a retry
//! policy by error class, and (c) cancellation. Degradation hooks live in
//! the stages: when the kernel gives up it returns the last error and the
//! stage substitutes its deterministic fallback.
//!
//! Retry policy: only retryable errors are retried, bounded by
//! [`RetryConfig::max_retries`], with exponential backoff and jitter. A
//! collaborator-suggested `retry_after` wins over the backoff when larger.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use rinkcast_core::retry::RetryConfig;

use crate::collaborator::{CollaboratorError, CollaboratorResult};

/// Wraps collaborator calls with timeout, retry, and cancellation.
#[derive(Clone)]
pub struct RetryKernel {
    config: RetryConfig,
    cancel: CancellationToken,
}

impl RetryKernel {
    /// Create a kernel with the given retry parameters.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use a shared cancellation token (pipeline shutdown).
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The kernel's retry configuration.
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `factory` with a per-attempt timeout, retrying retryable failures.
    ///
    /// `op` names the call for logs and metrics. The factory is invoked once
    /// per attempt.
    pub async fn call<T, F, Fut>(
        &self,
        op: &str,
        timeout: Duration,
        mut factory: F,
    ) -> CollaboratorResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CollaboratorResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return Err(CollaboratorError::Cancelled);
            }

            let started = std::time::Instant::now();
            let result = tokio::select! {
                r = tokio::time::timeout(timeout, factory()) => match r {
                    Ok(inner) => inner,
                    Err(_) => Err(CollaboratorError::Timeout {
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    }),
                },
                () = self.cancel.cancelled() => Err(CollaboratorError::Cancelled),
            };

            match result {
                Ok(value) => {
                    metrics::histogram!("collaborator_call_duration_seconds", "op" => op.to_owned())
                        .record(started.elapsed().as_secs_f64());
                    return Ok(value);
                }
                Err(err) => {
                    if !err.is_retryable() || attempt >= self.config.max_retries {
                        warn!(op, attempt, error = %err, "collaborator call failed terminally");
                        return Err(err);
                    }

                    let backoff = self.config.delay_for_attempt(attempt, jitter_seed());
                    let delay_ms = err.retry_after_ms().map_or(backoff, |ra| backoff.max(ra));
                    attempt += 1;

                    metrics::counter!(
                        "collaborator_retries_total",
                        "op" => op.to_owned(),
                        "category" => err.category(),
                    )
                    .increment(1);
                    debug!(op, attempt, delay_ms, error = %err, "retrying collaborator call");

                    tokio::select! {
                        () = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                        () = self.cancel.cancelled() => return Err(CollaboratorError::Cancelled),
                    }
                }
            }
        }
    }
}

/// Jitter source in `[0.0, 1.0)` from the wall clock's sub-second nanos.
fn jitter_seed() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos) / f64::from(1_000_000_000u32)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter_factor: 0.0,
        }
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let kernel = RetryKernel::new(quick_config(2));
        let result = kernel
            .call("test", Duration::from_secs(1), || async { Ok(42) })
            .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let kernel = RetryKernel::new(quick_config(3));
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = kernel
            .call("test", Duration::from_secs(1), move || {
                let attempts = attempts_clone.clone();
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(CollaboratorError::Api {
                            status: 503,
                            message: "overloaded".into(),
                            retryable: true,
                        })
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn bounded_retries_then_surfaces_error() {
        let kernel = RetryKernel::new(quick_config(2));
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result: CollaboratorResult<()> = kernel
            .call("test", Duration::from_secs(1), move || {
                let attempts = attempts_clone.clone();
                async move {
                    let _ = attempts.fetch_add(1, Ordering::SeqCst);
                    Err(CollaboratorError::Timeout { timeout_ms: 10 })
                }
            })
            .await;

        assert!(matches!(result, Err(CollaboratorError::Timeout { .. })));
        // initial attempt + 2 retries
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_fails_immediately() {
        let kernel = RetryKernel::new(quick_config(5));
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result: CollaboratorResult<()> = kernel
            .call("test", Duration::from_secs(1), move || {
                let attempts = attempts_clone.clone();
                async move {
                    let _ = attempts.fetch_add(1, Ordering::SeqCst);
                    Err(CollaboratorError::Malformed {
                        message: "bad payload".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(CollaboratorError::Malformed { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let kernel = RetryKernel::new(quick_config(0));
        let result: CollaboratorResult<()> = kernel
            .call("test", Duration::from_millis(20), || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(CollaboratorError::Timeout { .. })));
    }

    #[tokio::test]
    async fn cancellation_interrupts_retry_wait() {
        let token = CancellationToken::new();
        let kernel = RetryKernel::new(RetryConfig {
            max_retries: 5,
            base_delay_ms: 60_000,
            max_delay_ms: 60_000,
            jitter_factor: 0.0,
        })
        .with_cancel_token(token.clone());

        let task = tokio::spawn(async move {
            kernel
                .call("test", Duration::from_secs(1), || async {
                    Err::<(), _>(CollaboratorError::Api {
                        status: 500,
                        message: "boom".into(),
                        retryable: true,
                    })
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        let result = task.await.unwrap();
        assert!(matches!(result, Err(CollaboratorError::Cancelled)));
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let kernel = RetryKernel::new(quick_config(2)).with_cancel_token(token);
        let result: CollaboratorResult<()> = kernel
            .call("test", Duration::from_secs(1), || async { Ok(()) })
            .await;
        assert!(matches!(result, Err(CollaboratorError::Cancelled)));
    }

    #[tokio::test]
    async fn retry_after_dominates_small_backoff() {
        let kernel = RetryKernel::new(quick_config(1));
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let start = std::time::Instant::now();
        let result = kernel
            .call("test", Duration::from_secs(1), move || {
                let attempts = attempts_clone.clone();
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(CollaboratorError::RateLimited {
                            retry_after_ms: 50,
                            message: "slow down".into(),
                        })
                    } else {
                        Ok(1)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 1);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn jitter_seed_in_range() {
        for _ in 0..100 {
            let seed = jitter_seed();
            assert!((0.0..1.0).contains(&seed));
        }
    }
}
