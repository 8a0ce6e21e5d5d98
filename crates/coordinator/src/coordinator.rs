//! The companion coordinator: chat, emotion tracking and coaching.

use crate::chatbot::{ChatServices, Chatbot};
use crate::config::CompanionConfig;
use crate::prompts;
use companion_common::{CompanionError, EmotionLabel, EmotionRecord, Result};
use companion_emotion::{
    build_classifier, classify_or_neutral, EmotionClassifier, StreakDetector,
};
use companion_llm::{build_llm_client, ChatMessage, LlmClient, LlmRequest};
use companion_memory::{Embedder, MemoryBuffer, SqliteStore};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Result of a chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub user: String,
    pub message: String,
    pub emotion: EmotionLabel,
    pub recent_emotions: Vec<EmotionRecord>,
    pub warning: Option<String>,
    pub response: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmotionAnalysis {
    pub user: String,
    pub input_text: String,
    pub analyzed_emotion: EmotionLabel,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Coaching {
    pub text: String,
    pub emotion: EmotionLabel,
    pub coaching: String,
}

/// Orchestrates the classifier, the store and the chat model.
///
/// Operations that write for a user hold that user's lock, so two requests
/// for the same user never interleave their read-modify-write of memory.
pub struct Coordinator {
    services: Arc<ChatServices>,
    classifier: Arc<dyn EmotionClassifier>,
    streak: StreakDetector,
    recent_limit: usize,
    user_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Coordinator {
    /// Connect the store and build the configured clients.
    pub async fn new(config: &CompanionConfig) -> Result<Self> {
        info!("Initializing companion coordinator");

        let store = SqliteStore::connect(&config.memory.database_url).await?;
        let llm = build_llm_client(&config.llm)?;
        let classifier = build_classifier(&config.classifier, Arc::clone(&llm))?;
        let embedder = config.build_embedder()?;

        Ok(Self::from_parts(store, llm, classifier, embedder, config))
    }

    /// Assemble a coordinator from already-built parts.
    pub fn from_parts(
        store: SqliteStore,
        llm: Arc<dyn LlmClient>,
        classifier: Arc<dyn EmotionClassifier>,
        embedder: Option<Arc<dyn Embedder>>,
        config: &CompanionConfig,
    ) -> Self {
        let services = ChatServices::new(
            store,
            llm,
            embedder,
            config.memory.clone(),
            config.retrieval.clone(),
            &config.llm,
        );
        Self {
            services: Arc::new(services),
            classifier,
            streak: StreakDetector::new(config.emotions.streak.clone()),
            recent_limit: config.emotions.recent_limit.max(1),
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn llm_model(&self) -> &str {
        self.services.llm.model_name()
    }

    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }

    pub fn store(&self) -> &SqliteStore {
        &self.services.store
    }

    fn user_lock(&self, user_name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.user_locks.lock();
        // forget locks nobody is holding or waiting on
        if locks.len() > 1024 {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Arc::clone(locks.entry(user_name.to_string()).or_default())
    }

    /// Classify, record, check for a negative streak, then answer.
    #[instrument(skip(self, message), fields(user = %user_name))]
    pub async fn chat(&self, user_name: &str, message: &str) -> Result<ChatOutcome> {
        let user_name = validate_user(user_name)?;
        if message.trim().is_empty() {
            return Err(CompanionError::Validation("message must not be empty".into()));
        }

        let lock = self.user_lock(user_name);
        let _guard = lock.lock().await;

        let emotion = classify_or_neutral(self.classifier.as_ref(), message).await;
        self.services.store.save_emotion(user_name, emotion).await?;

        let recent_emotions = self
            .services
            .store
            .recent_emotions(user_name, self.recent_limit)
            .await?;

        let warning = self.streak.detect(&recent_emotions);
        if let Some(ref w) = warning {
            warn!(occurrences = w.timestamps.len(), "Negative emotion streak detected");
        }

        let prompt = prompts::emotion_annotated_input(message, &recent_emotions);
        let mut chatbot = Chatbot::load(user_name, Arc::clone(&self.services)).await?;
        let response = chatbot.chat(&prompt).await?;

        Ok(ChatOutcome {
            user: user_name.to_string(),
            message: message.to_string(),
            emotion,
            recent_emotions,
            warning: warning.map(|w| w.message),
            response,
        })
    }

    /// Classify `text` and record the result in the user's history.
    #[instrument(skip(self, text), fields(user = %user_name))]
    pub async fn analyze_emotion(&self, user_name: &str, text: &str) -> Result<EmotionAnalysis> {
        let user_name = validate_user(user_name)?;

        let lock = self.user_lock(user_name);
        let _guard = lock.lock().await;

        let emotion = classify_or_neutral(self.classifier.as_ref(), text).await;
        let record = self.services.store.save_emotion(user_name, emotion).await?;

        Ok(EmotionAnalysis {
            user: user_name.to_string(),
            input_text: text.to_string(),
            analyzed_emotion: record.emotion,
            timestamp: record.timestamp,
        })
    }

    /// The user's latest emotion records, newest first.
    pub async fn recent_emotions(&self, user_name: &str) -> Result<Vec<EmotionRecord>> {
        let user_name = validate_user(user_name)?;
        self.services
            .store
            .recent_emotions(user_name, self.recent_limit)
            .await
    }

    /// A coaching message tuned to the emotion detected in `text`.
    #[instrument(skip(self, text))]
    pub async fn coach(&self, text: &str) -> Result<Coaching> {
        if text.trim().is_empty() {
            return Err(CompanionError::Validation("text must not be empty".into()));
        }

        let emotion = classify_or_neutral(self.classifier.as_ref(), text).await;
        let mut request = LlmRequest::new(vec![ChatMessage::user(text)])
            .with_system_prompt(prompts::coaching_system_prompt(emotion));
        request.temperature = self.services.temperature;
        request.max_tokens = self.services.max_tokens;

        let response = self.services.llm.complete(request).await?;
        debug!(emotion = %emotion, "Generated coaching message");

        Ok(Coaching {
            text: text.to_string(),
            emotion,
            coaching: response.content,
        })
    }

    /// The user's stored buffer, seeded with the preamble.
    pub async fn memory(&self, user_name: &str) -> Result<MemoryBuffer> {
        let user_name = validate_user(user_name)?;
        self.services
            .store
            .load_memory(user_name, &self.services.memory.persona)
            .await
    }

    /// Forget the user's conversation. Emotion history is kept.
    pub async fn reset_memory(&self, user_name: &str) -> Result<bool> {
        let user_name = validate_user(user_name)?;

        let lock = self.user_lock(user_name);
        let _guard = lock.lock().await;

        let deleted = self.services.store.delete_memory(user_name).await?;
        info!(user = %user_name, deleted, "Reset memory");
        Ok(deleted)
    }
}

fn validate_user(user_name: &str) -> Result<&str> {
    let trimmed = user_name.trim();
    if trimmed.is_empty() {
        return Err(CompanionError::Validation("user_name must not be empty".into()));
    }
    Ok(trimmed)
}
