//! Timeout and exponential backoff around provider calls.
//!
//! Uses `backon` with jitter. Only [`ProviderError::Unreachable`] is retried;
//! a rejection is final.

use std::future::Future;
use std::time::{Duration, Instant};

use backon::{ExponentialBuilder, Retryable};

use crate::provider::ProviderError;

/// How long a single provider call may take and how often it is retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_retries: 3,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
            .with_jitter()
    }

    /// Runs `call` until it succeeds, is rejected or runs out of retries.
    ///
    /// Each attempt is bounded by `timeout`; an attempt that times out
    /// counts as unreachable.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        mut call: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let timeout = self.timeout;
        let started = Instant::now();

        let result = (|| {
            let attempt = call();
            async move {
                tokio::time::timeout(timeout, attempt)
                    .await
                    .unwrap_or_else(|_| {
                        Err(ProviderError::Unreachable(format!(
                            "no answer within {}ms",
                            timeout.as_millis()
                        )))
                    })
            }
        })
        .retry(self.backoff())
        .sleep(tokio::time::sleep)
        .when(ProviderError::is_transient)
        .notify(|err, delay| {
            tracing::warn!(operation, error = %err, ?delay, "retrying provider call");
        })
        .await;

        metrics::histogram!("provider_call_duration_seconds", "operation" => operation)
            .record(started.elapsed().as_secs_f64());
        if let Err(err) = &result {
            metrics::counter!(
                "payment_provider_errors_total",
                "operation" => operation,
                "kind" => err.kind()
            )
            .increment(1);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(50),
            max_retries,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result = fast(3)
            .run("test", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ProviderError::Unreachable("down".into()))
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
    async fn rejection_is_not_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<(), _> = fast(3)
            .run("test", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::Rejected("declined".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Rejected(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<(), _> = fast(2)
            .run("test", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::Unreachable("down".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Unreachable(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let result: Result<(), _> = fast(0)
            .run("test", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Unreachable(msg)) if msg.contains("50ms")));
    }
}
