//! Retry/backoff/timeout executor wrapping every outbound provider call.
//!
//! Providers hold a [`ResilienceExecutor`] by value and delegate each network
//! operation to it. Retry state lives on the call stack, so a single provider
//! instance is safe to share across concurrent calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{ErrorKind, ProviderError};

/// Backoff ceiling for LLM calls.
pub const LLM_BACKOFF_CAP: Duration = Duration::from_secs(60);
/// Backoff ceiling for embedding calls.
pub const EMBEDDING_BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Per-provider retry policy. Cheap to clone; one per provider instance.
#[derive(Debug, Clone)]
pub struct ResilienceExecutor {
    provider: &'static str,
    max_retries: u32,
    retry_delay: Duration,
    timeout: Duration,
    backoff_cap: Duration,
}

impl ResilienceExecutor {
    pub fn new(
        provider: &'static str,
        max_retries: u32,
        retry_delay: Duration,
        timeout: Duration,
        backoff_cap: Duration,
    ) -> Self {
        Self {
            provider,
            max_retries,
            retry_delay,
            timeout,
            backoff_cap,
        }
    }

    /// Executor with the LLM backoff ceiling (60s).
    pub fn for_llm(
        provider: &'static str,
        max_retries: u32,
        retry_delay_ms: u64,
        timeout_ms: u64,
    ) -> Self {
        Self::new(
            provider,
            max_retries,
            Duration::from_millis(retry_delay_ms),
            Duration::from_millis(timeout_ms),
            LLM_BACKOFF_CAP,
        )
    }

    /// Executor with the embedding backoff ceiling (30s).
    pub fn for_embedding(
        provider: &'static str,
        max_retries: u32,
        retry_delay_ms: u64,
        timeout_ms: u64,
    ) -> Self {
        Self::new(
            provider,
            max_retries,
            Duration::from_millis(retry_delay_ms),
            Duration::from_millis(timeout_ms),
            EMBEDDING_BACKOFF_CAP,
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `op` with per-attempt timeout, retrying transient failures until
    /// the retry budget is exhausted.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.run(op, None).await
    }

    /// Like [`execute`](Self::execute), but a cancelled token aborts the
    /// in-flight attempt and suppresses further retries.
    pub async fn execute_cancellable<T, F, Fut>(
        &self,
        op: F,
        cancel: &CancellationToken,
    ) -> Result<T, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.run(op, Some(cancel)).await
    }

    async fn run<T, F, Fut>(
        &self,
        op: F,
        cancel: Option<&CancellationToken>,
    ) -> Result<T, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        // `attempt` bounds the total budget; `backoff_attempt` advances only
        // for failures that go through the exponential schedule, so an
        // explicit rate-limit hint does not inflate later delays.
        let mut attempt: u32 = 0;
        let mut backoff_attempt: u32 = 0;

        loop {
            if let Some(token) = cancel {
                if token.is_cancelled() {
                    return Err(self.cancelled());
                }
            }

            let timed = tokio::time::timeout(self.timeout, op());
            let outcome = match cancel {
                Some(token) => tokio::select! {
                    _ = token.cancelled() => return Err(self.cancelled()),
                    outcome = timed => outcome,
                },
                None => timed.await,
            };

            let err = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => err,
                Err(_) => ProviderError::new(
                    self.provider,
                    ErrorKind::Timeout,
                    format!("request exceeded {}ms deadline", self.timeout.as_millis()),
                ),
            };

            if !err.retryable() {
                return Err(err);
            }
            if attempt >= self.max_retries {
                return Err(ProviderError::new(
                    self.provider,
                    ErrorKind::MaxRetriesExceeded,
                    format!("{} attempts failed, last error: {err}", attempt + 1),
                ));
            }

            let delay = match err.retry_after() {
                // Honor the vendor's hint exactly; the exponential schedule
                // does not advance for this attempt.
                Some(hint) => hint,
                None => {
                    let delay = self.backoff_delay(backoff_attempt);
                    backoff_attempt += 1;
                    delay
                }
            };

            warn!(
                provider = self.provider,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient provider error, retrying"
            );

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// `min(retry_delay * 2^attempt + uniform(0, retry_delay), cap)`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.retry_delay.as_millis() as u64;
        let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(20));
        let jitter_ms = rand::thread_rng().gen_range(0..=base_ms);
        Duration::from_millis(exp_ms.saturating_add(jitter_ms)).min(self.backoff_cap)
    }

    fn cancelled(&self) -> ProviderError {
        ProviderError::new(self.provider, ErrorKind::Cancelled, "call cancelled by caller")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn executor(max_retries: u32) -> ResilienceExecutor {
        ResilienceExecutor::new(
            "mock",
            max_retries,
            Duration::from_millis(10),
            Duration::from_secs(5),
            Duration::from_secs(30),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn retry_bound_is_max_retries_plus_one() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = executor(3)
            .execute(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::new(
                        "mock",
                        ErrorKind::Server { status: 500 },
                        "boom",
                    ))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::MaxRetriesExceeded);
        assert!(!err.retryable());
        assert!(err.message.contains("boom"));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_short_circuits_unwrapped() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = executor(3)
            .execute(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::new("mock", ErrorKind::Auth, "bad key"))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Auth);
        assert_eq!(err.message, "bad key");
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_hint_is_honored() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let start = tokio::time::Instant::now();

        let result = executor(3)
            .execute(|| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(ProviderError::new(
                            "mock",
                            ErrorKind::RateLimit {
                                retry_after: Some(Duration::from_millis(500)),
                            },
                            "slow down",
                        ))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_surfaces_and_is_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let exec = ResilienceExecutor::new(
            "mock",
            1,
            Duration::from_millis(10),
            Duration::from_millis(50),
            Duration::from_secs(30),
        );

        let result: Result<(), _> = exec
            .execute(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(600)).await;
                    Ok(())
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::MaxRetriesExceeded);
        assert!(err.message.contains("deadline"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_without_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let token = CancellationToken::new();
        let cancel = token.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let result: Result<(), _> = executor(5)
            .execute_cancellable(
                || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(())
                    }
                },
                &token,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().kind, ErrorKind::Cancelled);
    }

    #[test]
    fn backoff_is_capped() {
        let exec = ResilienceExecutor::new(
            "mock",
            10,
            Duration::from_secs(10),
            Duration::from_secs(5),
            Duration::from_secs(30),
        );
        for attempt in 0..12 {
            assert!(exec.backoff_delay(attempt) <= Duration::from_secs(30));
        }
    }
}
