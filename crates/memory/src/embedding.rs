//! Text embeddings for the retrieval index.
//!
//! [`OpenAiEmbedder`] calls a hosted `/v1/embeddings` endpoint. With the
//! `local-embeddings` feature, [`LocalEmbedder`] runs all-MiniLM-L6-v2
//! in-process through fastembed.

use async_trait::async_trait;
use companion_common::{CompanionError, Result};
use companion_llm::http::{check_status, transport_error};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed every text, preserving order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CompanionError::Embedding("Empty embedding result".into()))
    }

    fn model_name(&self) -> &str;
}

const SERVICE: &str = "openai-embeddings";
const DEFAULT_BASE_URL: &str = "https://api.openai.com";

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    base_url: String,
    model: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl OpenAiEmbedder {
    pub fn new(
        base_url: Option<String>,
        model: String,
        api_key: Option<String>,
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
            model,
            api_key,
            http_client,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    #[instrument(skip(self, texts), fields(batch_size = texts.len()))]
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let mut http_req = self.http_client.post(&url).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(ref key) = self.api_key {
            http_req = http_req.bearer_auth(key);
        }

        let response = http_req
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| CompanionError::Embedding(format!("Failed to parse embeddings: {e}")))?;

        if parsed.data.len() != texts.len() {
            return Err(CompanionError::Embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        // the API may answer out of order
        parsed.data.sort_by_key(|d| d.index);

        debug!(
            dimension = parsed.data.first().map(|d| d.embedding.len()).unwrap_or(0),
            "Generated batch embeddings"
        );

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(feature = "local-embeddings")]
mod local {
    use super::*;
    use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
    use once_cell::sync::OnceCell;
    use std::sync::{Arc, Mutex};
    use tracing::info;

    /// In-process embeddings; the model is loaded on first use.
    pub struct LocalEmbedder {
        model: OnceCell<Arc<Mutex<TextEmbedding>>>,
    }

    impl LocalEmbedder {
        pub fn new() -> Self {
            Self {
                model: OnceCell::new(),
            }
        }

        fn get_or_init_model(&self) -> Result<Arc<Mutex<TextEmbedding>>> {
            self.model
                .get_or_try_init(|| {
                    info!("Initializing local embedding model");
                    let options = TextInitOptions::new(EmbeddingModel::AllMiniLML6V2)
                        .with_show_download_progress(false);
                    let model = TextEmbedding::try_new(options)
                        .map_err(|e| CompanionError::Embedding(e.to_string()))?;
                    Ok(Arc::new(Mutex::new(model)))
                })
                .cloned()
        }
    }

    impl Default for LocalEmbedder {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Embedder for LocalEmbedder {
        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let model = self.get_or_init_model()?;
            let texts: Vec<String> = texts.iter().map(|s| s.to_string()).collect();

            // fastembed is synchronous
            tokio::task::spawn_blocking(move || {
                let mut model = model
                    .lock()
                    .map_err(|_| CompanionError::Embedding("Embedding model lock poisoned".into()))?;
                model
                    .embed(texts, None)
                    .map_err(|e| CompanionError::Embedding(e.to_string()))
            })
            .await
            .map_err(|e| CompanionError::Embedding(format!("Blocking task failed: {e}")))?
        }

        fn model_name(&self) -> &str {
            "all-MiniLM-L6-v2"
        }
    }
}

#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbedder;

#[cfg(test)]
mod tests {
    use super::*;

    struct LengthEmbedder;

    #[async_trait]
    impl Embedder for LengthEmbedder {
        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }
        fn model_name(&self) -> &str {
            "length"
        }
    }

    #[tokio::test]
    async fn default_embed_uses_batch() {
        let embedding = LengthEmbedder.embed("four").await.unwrap();
        assert_eq!(embedding, vec![4.0]);
    }

    #[test]
    fn request_body_shape() {
        let texts = ["a", "b"];
        let json = serde_json::to_value(EmbeddingRequest {
            model: "text-embedding-3-small",
            input: &texts,
        })
        .unwrap();
        assert_eq!(json["model"], "text-embedding-3-small");
        assert_eq!(json["input"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_batch_skips_the_network() {
        // unroutable address: any request would fail
        let embedder = OpenAiEmbedder::new(
            Some("http://127.0.0.1:9".into()),
            "text-embedding-3-small".into(),
            None,
            Duration::from_millis(100),
        )
        .unwrap();
        assert!(embedder.embed_batch(&[]).await.unwrap().is_empty());
    }
}
