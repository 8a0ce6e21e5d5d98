use async_trait::async_trait;
use companion_common::{EmotionLabel, Result};
use companion_llm::RetryConfig;
use std::time::Duration;
use tracing::{debug, warn};

#[async_trait]
pub trait EmotionClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<EmotionLabel>;

    /// Short identifier reported by the health endpoint.
    fn name(&self) -> &str;
}

/// Classify `text`, treating blank input and classifier failures as neutral.
pub async fn classify_or_neutral(classifier: &dyn EmotionClassifier, text: &str) -> EmotionLabel {
    if text.trim().is_empty() {
        return EmotionLabel::Neutral;
    }

    match classifier.classify(text).await {
        Ok(label) => {
            debug!(classifier = classifier.name(), emotion = %label, "Classified emotion");
            label
        }
        Err(e) => {
            warn!(
                classifier = classifier.name(),
                error = %e,
                "Emotion analysis failed, defaulting to neutral"
            );
            EmotionLabel::Neutral
        }
    }
}

/// Retries rate-limited, server-side and transport failures of a classifier.
pub struct RetryingClassifier<T: EmotionClassifier> {
    inner: T,
    config: RetryConfig,
}

impl<T: EmotionClassifier> RetryingClassifier<T> {
    pub fn new(inner: T, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl<T: EmotionClassifier> EmotionClassifier for RetryingClassifier<T> {
    async fn classify(&self, text: &str) -> Result<EmotionLabel> {
        let mut attempt = 0;
        loop {
            match self.inner.classify(text).await {
                Ok(label) => return Ok(label),
                Err(e) if attempt < self.config.max_retries && e.is_retryable() => {
                    let delay = e
                        .retry_after_ms()
                        .map(|ms| ms.min(self.config.max_delay_ms))
                        .unwrap_or_else(|| self.config.delay_for(attempt));

                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay,
                        error = %e,
                        "Retrying classifier request"
                    );

                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
