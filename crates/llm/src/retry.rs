use async_trait::async_trait;
use companion_common::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::client::{LlmClient, LlmRequest, LlmResponse};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Backoff for the given zero-based attempt, capped at `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> u64 {
        let base = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let jitter = (base * 0.1 * jitter_fraction(attempt)) as u64;
        (base as u64).saturating_add(jitter).min(self.max_delay_ms)
    }
}

/// Spread in [0, 1) keyed on the attempt number only. Every client backs
/// off by the same amount for a given attempt; this varies the step, it
/// does not desynchronise concurrent callers.
fn jitter_fraction(attempt: u32) -> f64 {
    let x = attempt.wrapping_add(1).wrapping_mul(2_654_435_761);
    (x % 100) as f64 / 100.0
}

/// Wraps a client and retries rate-limited, server-side and transport failures.
pub struct RetryingClient<T: LlmClient> {
    inner: T,
    config: RetryConfig,
}

impl<T: LlmClient> RetryingClient<T> {
    pub fn new(inner: T, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl<T: LlmClient> LlmClient for RetryingClient<T> {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < self.config.max_retries && e.is_retryable() => {
                    let delay = e
                        .retry_after_ms()
                        .map(|ms| ms.min(self.config.max_delay_ms))
                        .unwrap_or_else(|| self.config.delay_for(attempt));

                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay,
                        error = %e,
                        "Retrying LLM request"
                    );

                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use companion_common::CompanionError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn default_retry_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_delay_ms, 500);
        assert_eq!(config.max_delay_ms, 30_000);
        assert!((config.backoff_multiplier - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn delay_grows_and_respects_max() {
        let config = RetryConfig {
            max_retries: 5,
            initial_delay_ms: 100,
            max_delay_ms: 2000,
            backoff_multiplier: 10.0,
        };
        assert!(config.delay_for(0) >= 100);
        assert!(config.delay_for(1) >= 1000);
        assert!(config.delay_for(5) <= 2000);
    }

    #[test]
    fn jitter_is_per_attempt_and_bounded() {
        let config = RetryConfig::default();
        let other = RetryConfig::default();
        for attempt in 0..4 {
            let delay = config.delay_for(attempt);
            let base = 500 * 2u64.pow(attempt);
            assert_eq!(delay, other.delay_for(attempt));
            assert!(delay >= base && delay < base + base / 10 + 1, "{attempt}: {delay}");
        }
    }

    /// Fails with the given status `failures` times, then succeeds.
    struct FlakyClient {
        failures: u32,
        status: u16,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmClient for FlakyClient {
        async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(CompanionError::Upstream {
                    service: "openai",
                    status: Some(self.status),
                    message: "flaky".into(),
                    retry_after_ms: Some(1),
                });
            }
            Ok(LlmResponse {
                content: "ok".to_string(),
                model: "flaky".to_string(),
                usage: None,
                finish_reason: None,
            })
        }
        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 1.0,
        }
    }

    fn flaky(failures: u32, status: u16) -> FlakyClient {
        FlakyClient {
            failures,
            status,
            calls: AtomicU32::new(0),
        }
    }

    #[tokio::test]
    async fn retries_rate_limits_until_success() {
        let client = RetryingClient::new(flaky(2, 429), fast_config(3));
        let response = client.complete(LlmRequest::default()).await.unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let client = RetryingClient::new(flaky(10, 503), fast_config(2));
        let err = client.complete(LlmRequest::default()).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let client = RetryingClient::new(flaky(1, 401), fast_config(3));
        assert!(client.complete(LlmRequest::default()).await.is_err());
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 1);
    }
}
