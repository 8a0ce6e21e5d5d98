use crate::classifier::{EmotionClassifier, RetryingClassifier};
use crate::huggingface::{HuggingFaceClassifier, DEFAULT_MODEL};
use crate::llm::LlmEmotionClassifier;
use companion_common::{CompanionError, Result};
use companion_llm::{LlmClient, RetryConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Configuration for the emotion classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// "huggingface" or "llm"
    pub provider: String,
    pub model: String,
    pub api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    pub timeout_ms: u64,
    /// Have the hosted API hold requests while a cold model loads
    pub wait_for_model: bool,
    /// Applies to the hosted model; the `llm` provider retries in the chat client
    pub retry: RetryConfig,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: "huggingface".into(),
            model: DEFAULT_MODEL.into(),
            api_url: None,
            api_token: None,
            timeout_ms: 30_000,
            wait_for_model: false,
            retry: RetryConfig {
                max_retries: 2,
                ..Default::default()
            },
        }
    }
}

impl ClassifierConfig {
    /// The configured token, or `HF_API_TOKEN` from the environment.
    pub fn resolve_api_token(&self) -> Option<String> {
        self.api_token
            .clone()
            .or_else(|| std::env::var("HF_API_TOKEN").ok())
            .filter(|t| !t.is_empty())
    }
}

/// Build the configured classifier. The `llm` provider reuses the chat client.
pub fn build_classifier(
    config: &ClassifierConfig,
    llm: Arc<dyn LlmClient>,
) -> Result<Arc<dyn EmotionClassifier>> {
    let classifier: Arc<dyn EmotionClassifier> = match config.provider.as_str() {
        "huggingface" => Arc::new(RetryingClassifier::new(
            HuggingFaceClassifier::new(
                config.api_url.clone(),
                Some(config.model.clone()),
                config.resolve_api_token(),
                Duration::from_millis(config.timeout_ms),
            )?
            .with_wait_for_model(config.wait_for_model),
            config.retry.clone(),
        )),
        "llm" => Arc::new(LlmEmotionClassifier::new(llm)),
        other => {
            return Err(CompanionError::Config(format!(
                "Unknown classifier provider: {other}"
            )));
        }
    };

    info!(provider = %config.provider, name = classifier.name(), "Built emotion classifier");
    Ok(classifier)
}
