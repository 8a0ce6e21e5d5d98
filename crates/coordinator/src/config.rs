//! Configuration for the companion backend.
//!
//! # Security
//!
//! - Config file permission validation on Unix systems
//! - Rejects world-readable files containing API keys
//! - Warns about API keys stored in config files

use companion_common::{CompanionError, Result};
use companion_emotion::{ClassifierConfig, StreakConfig};
use companion_llm::LlmConfig;
use companion_memory::{Embedder, EmbeddingConfig, MemoryConfig, OpenAiEmbedder, RetrievalConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Top-level configuration, one section per concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub classifier: ClassifierConfig,
    pub embeddings: EmbeddingConfig,
    pub memory: MemoryConfig,
    pub retrieval: RetrievalConfig,
    pub emotions: EmotionsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origins; empty allows any origin
    pub cors_origins: Vec<String>,

    /// Bearer token required on every route except `/health`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            cors_origins: Vec::new(),
            api_key: None,
            body_limit_bytes: 64 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionsConfig {
    /// Records returned by the recent-emotions lookups
    pub recent_limit: usize,
    pub streak: StreakConfig,
}

impl Default for EmotionsConfig {
    fn default() -> Self {
        Self {
            recent_limit: 5,
            streak: StreakConfig::default(),
        }
    }
}

impl CompanionConfig {
    /// Load configuration from a TOML file.
    ///
    /// On Unix the file must be a regular file that is not world-writable,
    /// and not world-readable when it holds an API key.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        #[cfg(unix)]
        validate_config_file_permissions(path)?;

        let config = Self::from_file_unchecked(path)?;

        if config.llm.api_key.is_some()
            || config.classifier.api_token.is_some()
            || config.embeddings.api_key.is_some()
        {
            warn!(
                "API key found in config file '{}'. For better security, \
                 use environment variables instead (OPENAI_API_KEY, HF_API_TOKEN).",
                path.display()
            );
        }

        Ok(config)
    }

    /// Load configuration from a TOML file without permission checks.
    pub fn from_file_unchecked(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            CompanionError::Config(format!("Invalid config file '{}': {e}", path.display()))
        })
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`; empty values are ignored.
    ///
    /// `DATABASE_URL`, `COMPANION_API_KEY`, `COMPANION_BIND_ADDR` (`host:port`)
    /// and `COMPANION_CORS_ORIGINS` (comma separated).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("DATABASE_URL") {
            self.memory.database_url = url;
        }
        if let Some(key) = get("COMPANION_API_KEY") {
            self.server.api_key = Some(key);
        }
        if let Some(addr) = get("COMPANION_BIND_ADDR") {
            let (host, port) = addr.rsplit_once(':').ok_or_else(|| {
                CompanionError::Config(format!("COMPANION_BIND_ADDR must be host:port, got '{addr}'"))
            })?;
            self.server.port = port.parse().map_err(|_| {
                CompanionError::Config(format!("Invalid port in COMPANION_BIND_ADDR: '{port}'"))
            })?;
            self.server.host = host.trim_matches(|c| c == '[' || c == ']').to_string();
        }
        if let Some(origins) = get("COMPANION_CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        Ok(())
    }

    /// Embedding key from config first, then the chat key chain.
    fn resolve_embedding_key(&self) -> Option<String> {
        self.embeddings
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| self.llm.resolve_api_key())
    }

    /// Build the configured embedder, or `None` when retrieval is disabled.
    pub fn build_embedder(&self) -> Result<Option<Arc<dyn Embedder>>> {
        if !self.retrieval.enabled {
            return Ok(None);
        }

        let embedder: Arc<dyn Embedder> = match self.embeddings.provider.as_str() {
            "openai" => Arc::new(OpenAiEmbedder::new(
                self.embeddings
                    .api_url
                    .clone()
                    .or_else(|| self.llm.api_url.clone()),
                self.embeddings.model.clone(),
                self.resolve_embedding_key(),
                Duration::from_millis(self.embeddings.timeout_ms),
            )?),
            #[cfg(feature = "local-embeddings")]
            "local" => Arc::new(companion_memory::LocalEmbedder::new()),
            #[cfg(not(feature = "local-embeddings"))]
            "local" => {
                return Err(CompanionError::Config(
                    "Local embeddings require the `local-embeddings` feature".into(),
                ));
            }
            other => {
                return Err(CompanionError::Config(format!(
                    "Unknown embedding provider: {other}"
                )));
            }
        };

        info!(
            provider = %self.embeddings.provider,
            model = embedder.model_name(),
            "Built embedder"
        );
        Ok(Some(embedder))
    }
}

/// Validate config file permissions on Unix systems.
///
/// - File must be a regular file
/// - File must not be world-writable
/// - If the file contains an API key, it must not be world-readable
#[cfg(unix)]
fn validate_config_file_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::symlink_metadata(path).map_err(|e| {
        CompanionError::Config(format!("Failed to read config file '{}': {e}", path.display()))
    })?;

    if !metadata.is_file() {
        return Err(CompanionError::Config(format!(
            "Config path '{}' is not a regular file. Symlinks and directories are not allowed.",
            path.display()
        )));
    }

    let permission_bits = metadata.permissions().mode() & 0o777;

    if permission_bits & 0o002 != 0 {
        return Err(CompanionError::Config(format!(
            "Config file '{}' is world-writable (mode {:04o}). Fix with: chmod o-w {}",
            path.display(),
            permission_bits,
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let has_api_key = content.lines().any(|line| {
        let line = line.trim_start();
        (line.starts_with("api_key") || line.starts_with("api_token")) && line.contains('=')
    });

    if has_api_key && permission_bits & 0o004 != 0 {
        return Err(CompanionError::Config(format!(
            "Config file '{}' contains an API key but is world-readable (mode {:04o}). \
             Fix with: chmod 600 {}",
            path.display(),
            permission_bits,
            path.display()
        )));
    }

    if has_api_key && permission_bits & 0o040 != 0 {
        warn!(
            "Config file '{}' contains an API key and is group-readable (mode {:04o}). \
             Consider restricting access with: chmod 600 {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    Ok(())
}
