// src/provider/retry.rs — Transient-failure retry around a model backend
//
// Retried: 429 (honoring retry-after), 5xx, timeouts, connection failures.
// Surfaced at once: 4xx, auth failures, unreadable bodies.
// A retry here is invisible to the evaluator; only the final error is.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{Completion, CompletionRequest, ModelPrice, ModelProvider};
use crate::infra::errors::GateError;

/// Extra wait on top of a server-provided retry-after, within `max_delay`.
const RATE_LIMIT_PAD: Duration = Duration::from_millis(100);
const FLOOR: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first call; 0 disables retrying.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
    /// Spread applied to each backoff step, as a fraction of it.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

impl RetryConfig {
    /// How long to wait before retry number `retry` (0-based), or `None`
    /// when `error` should be returned to the caller.
    pub fn next_delay(&self, retry: u32, error: &GateError) -> Option<Duration> {
        if retry >= self.max_retries || !error.is_retriable() {
            return None;
        }
        if let GateError::RateLimited { retry_after_ms, .. } = error {
            if *retry_after_ms > 0 {
                let hinted = Duration::from_millis(*retry_after_ms).saturating_add(RATE_LIMIT_PAD);
                return Some(hinted.min(self.max_delay));
            }
        }
        Some(self.backoff(retry))
    }

    fn backoff(&self, retry: u32) -> Duration {
        let step = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(retry as i32);
        let capped = step.min(self.max_delay.as_secs_f64());
        let spread = spread_factor(retry, self.jitter);
        Duration::from_secs_f64(capped * spread).max(FLOOR)
    }
}

/// Reproducible multiplier in `[1 - jitter, 1 + jitter]`.
fn spread_factor(retry: u32, jitter: f64) -> f64 {
    let unit = retry.wrapping_mul(2_654_435_761) as f64 / u32::MAX as f64;
    1.0 + jitter * (2.0 * unit - 1.0)
}

/// Wraps a backend so transient failures are retried with backoff.
pub struct RetryProvider {
    inner: Arc<dyn ModelProvider>,
    config: RetryConfig,
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn ModelProvider>) -> Self {
        Self::with_config(inner, RetryConfig::default())
    }

    pub fn with_config(inner: Arc<dyn ModelProvider>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl ModelProvider for RetryProvider {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn price_list(&self) -> Vec<ModelPrice> {
        self.inner.price_list()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, GateError> {
        let mut retry = 0;
        loop {
            let err = match self.inner.complete(request.clone()).await {
                Ok(completion) => return Ok(completion),
                Err(e) => e,
            };
            let Some(delay) = self.config.next_delay(retry, &err) else {
                return Err(err);
            };
            tracing::warn!(
                provider = self.inner.id(),
                retry = retry + 1,
                max_retries = self.config.max_retries,
                delay_ms = delay.as_millis() as u64,
                "Transient provider failure: {}",
                err
            );
            tokio::time::sleep(delay).await;
            retry += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{StopReason, TokenUsage};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn overloaded() -> GateError {
        GateError::Provider {
            provider: "test".into(),
            message: "HTTP 529".into(),
            retriable: true,
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = RetryConfig::default();
        let d0 = config.next_delay(0, &overloaded()).unwrap();
        let d1 = config.next_delay(1, &overloaded()).unwrap();
        let d2 = config.next_delay(2, &overloaded()).unwrap();
        // About 2s, 4s, 8s within 20% spread
        assert!((1500..=2500).contains(&d0.as_millis()));
        assert!((3200..=4800).contains(&d1.as_millis()));
        assert!((6400..=9600).contains(&d2.as_millis()));

        let wide = RetryConfig {
            max_retries: 20,
            ..RetryConfig::default()
        };
        assert!(wide.next_delay(12, &overloaded()).unwrap() <= Duration::from_secs(36));
    }

    #[test]
    fn test_rate_limit_hint_wins() {
        let config = RetryConfig::default();
        let err = GateError::RateLimited {
            provider: "test".into(),
            retry_after_ms: 7_000,
        };
        assert_eq!(config.next_delay(0, &err), Some(Duration::from_millis(7_100)));

        // A zero hint falls back to backoff
        let err = GateError::RateLimited {
            provider: "test".into(),
            retry_after_ms: 0,
        };
        assert!(config.next_delay(0, &err).unwrap() >= Duration::from_millis(1500));

        // Absurd hints are capped
        let err = GateError::RateLimited {
            provider: "test".into(),
            retry_after_ms: u64::MAX,
        };
        assert_eq!(config.next_delay(0, &err), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_no_delay_for_permanent_or_exhausted() {
        let config = RetryConfig::default();
        let bad_request = GateError::Provider {
            provider: "test".into(),
            message: "HTTP 400".into(),
            retriable: false,
        };
        assert_eq!(config.next_delay(0, &bad_request), None);
        assert_eq!(config.next_delay(3, &overloaded()), None);
        assert_eq!(
            config.next_delay(0, &GateError::MissingEnv("ANTHROPIC_API_KEY".into())),
            None
        );
    }

    #[test]
    fn test_spread_factor_bounds() {
        for retry in 0..32 {
            let f = spread_factor(retry, 0.2);
            assert!((0.8..=1.2).contains(&f), "factor {f} for retry {retry}");
        }
        assert_eq!(spread_factor(4, 0.2), spread_factor(4, 0.2));
    }

    /// Fails the first `failures` calls, then answers "ok".
    struct FlakyProvider {
        failures: u32,
        retriable: bool,
        calls: AtomicU32,
    }

    impl FlakyProvider {
        fn new(failures: u32, retriable: bool) -> Self {
            Self {
                failures,
                retriable,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelProvider for FlakyProvider {
        fn id(&self) -> &str {
            "flaky"
        }
        fn price_list(&self) -> Vec<ModelPrice> {
            vec![ModelPrice::new("flaky-1", 1.0, 2.0)]
        }
        async fn complete(&self, _request: CompletionRequest) -> Result<Completion, GateError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(GateError::Provider {
                    provider: "flaky".into(),
                    message: "HTTP 529 overloaded".into(),
                    retriable: self.retriable,
                });
            }
            Ok(Completion {
                text: "ok".into(),
                usage: TokenUsage::default(),
                stop_reason: StopReason::EndTurn,
            })
        }
    }

    fn fast(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..RetryConfig::default()
        }
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let inner = Arc::new(FlakyProvider::new(2, true));
        let provider = RetryProvider::with_config(inner.clone(), fast(3));
        let done = provider.complete(CompletionRequest::default()).await.unwrap();
        assert_eq!(done.text, "ok");
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let inner = Arc::new(FlakyProvider::new(10, true));
        let provider = RetryProvider::with_config(inner.clone(), fast(2));
        let err = provider.complete(CompletionRequest::default()).await.unwrap_err();
        assert!(err.is_retriable());
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let inner = Arc::new(FlakyProvider::new(10, false));
        let provider = RetryProvider::with_config(inner.clone(), fast(5));
        assert!(provider.complete(CompletionRequest::default()).await.is_err());
        assert_eq!(inner.calls(), 1);
    }

    #[test]
    fn test_delegates_identity_and_prices() {
        let provider = RetryProvider::new(Arc::new(FlakyProvider::new(0, true)));
        assert_eq!(provider.id(), "flaky");
        assert_eq!(provider.price_list()[0].model, "flaky-1");
    }
}
