//! Memory configuration types.

use serde::{Deserialize, Serialize};

/// The personality preamble injected at the front of every memory buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Persona {
    /// Content of the system turn that marks a buffer as seeded
    pub system_label: String,

    /// Assistant turn that introduces the companion
    pub intro: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            system_label: "Base settings".into(),
            intro: "I'm Chaeju, a warm and emotional AI companion. \
                    I understand your feelings deeply and I'm always on your side. \
                    With gentle comfort and a bit of nerdy charm, I'll be your soulmate. \
                    I talk casually, like a close friend."
                .into(),
        }
    }
}

/// Configuration for conversation memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// SQLite connection URL
    pub database_url: String,

    /// Maximum conversation turns kept per user, preamble excluded (0 = unbounded)
    pub max_history_turns: usize,

    pub persona: Persona,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://emotions.db".into(),
            max_history_turns: 40,
            persona: Persona::default(),
        }
    }
}

/// Whose history the retrieval index is built from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalScope {
    /// Only the requesting user's turns that were pruned out of history
    User,
    /// Every user's stored turns, minus the requester's live history
    #[default]
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub enabled: bool,
    pub scope: RetrievalScope,
    pub top_k: usize,
    pub min_similarity: f32,
    /// Upper bound on indexed documents, newest kept
    pub max_documents: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scope: RetrievalScope::All,
            top_k: 4,
            min_similarity: 0.3,
            max_documents: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// "openai" or "local"
    pub provider: String,
    pub model: String,
    pub api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "text-embedding-3-small".into(),
            api_url: None,
            api_key: None,
            timeout_ms: 30_000,
        }
    }
}
