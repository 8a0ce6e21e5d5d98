//! Hosted sentiment model behind the Hugging Face inference API.

use crate::classifier::EmotionClassifier;
use async_trait::async_trait;
use companion_common::{CompanionError, EmotionLabel, Result};
use companion_llm::http::{check_status, transport_error};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

const SERVICE: &str = "huggingface";
pub const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co";
pub const DEFAULT_MODEL: &str = "nlptown/bert-base-multilingual-uncased-sentiment";

#[derive(Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<InferenceOptions>,
}

#[derive(Serialize)]
struct InferenceOptions {
    wait_for_model: bool,
}

/// Body of the 503 a cold model answers with.
#[derive(Deserialize)]
struct ModelLoading {
    estimated_time: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct LabelScore {
    label: String,
    score: f32,
}

/// Text-classification output comes back either as `[[{..}]]` (one list per
/// input) or flat `[{..}]`, depending on the deployment.
#[derive(Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

impl InferenceResponse {
    fn best(self) -> Option<LabelScore> {
        let scores = match self {
            InferenceResponse::Nested(batches) => batches.into_iter().flatten().collect(),
            InferenceResponse::Flat(scores) => scores,
        };
        scores
            .into_iter()
            .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
    }
}

pub struct HuggingFaceClassifier {
    base_url: String,
    model: String,
    api_token: Option<String>,
    wait_for_model: bool,
    http_client: reqwest::Client,
}

impl HuggingFaceClassifier {
    pub fn new(
        base_url: Option<String>,
        model: Option<String>,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CompanionError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_token,
            wait_for_model: false,
            http_client,
        })
    }

    /// Ask the API to hold the request until a cold model has loaded instead
    /// of answering 503.
    pub fn with_wait_for_model(mut self, wait: bool) -> Self {
        self.wait_for_model = wait;
        self
    }
}

/// A loading model reports its ETA as `estimated_time` seconds in the 503
/// body, not as `Retry-After`. Carry it over so retries wait long enough.
fn with_load_estimate(err: CompanionError) -> CompanionError {
    match err {
        CompanionError::Upstream {
            service,
            status: Some(503),
            message,
            retry_after_ms: None,
        } => {
            let retry_after_ms = message
                .split_once(": ")
                .and_then(|(_, body)| serde_json::from_str::<ModelLoading>(body).ok())
                .map(|loading| (loading.estimated_time.max(0.0) * 1000.0) as u64);
            CompanionError::Upstream {
                service,
                status: Some(503),
                message,
                retry_after_ms,
            }
        }
        other => other,
    }
}

#[async_trait]
impl EmotionClassifier for HuggingFaceClassifier {
    #[instrument(skip(self, text), fields(model = %self.model, text_len = text.len()))]
    async fn classify(&self, text: &str) -> Result<EmotionLabel> {
        let url = format!("{}/models/{}", self.base_url, self.model);
        let mut http_req = self
            .http_client
            .post(&url)
            .json(&InferenceRequest {
                inputs: text,
                options: self.wait_for_model.then_some(InferenceOptions {
                    wait_for_model: true,
                }),
            });
        if let Some(ref token) = self.api_token {
            http_req = http_req.bearer_auth(token);
        }

        let response = http_req
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let response = check_status(SERVICE, response)
            .await
            .map_err(with_load_estimate)?;

        let parsed: InferenceResponse = response.json().await.map_err(|e| {
            CompanionError::Classifier(format!("Failed to parse classifier output: {e}"))
        })?;

        let best = parsed
            .best()
            .ok_or_else(|| CompanionError::Classifier("Classifier returned no labels".into()))?;
        debug!(label = %best.label, score = best.score, "Top sentiment label");

        Ok(EmotionLabel::from_star_rating(&best.label))
    }

    fn name(&self) -> &str {
        &self.model
    }
}
