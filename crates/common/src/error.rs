//! Error types for the companion backend.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompanionError {
    /// A non-success answer (or transport failure) from a remote API.
    #[error("{service} request failed{}: {message}", status_suffix(.status))]
    Upstream {
        service: &'static str,
        status: Option<u16>,
        message: String,
        retry_after_ms: Option<u64>,
    },

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CompanionError {
    pub fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            status: None,
            message: message.into(),
            retry_after_ms: None,
        }
    }

    /// Rate limits, server-side failures and transport errors are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream { status: None, .. } => true,
            Self::Upstream {
                status: Some(code), ..
            } => *code == 429 || (500..=599).contains(code),
            _ => false,
        }
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::Upstream { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" with status {s}")).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, CompanionError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn with_status(code: u16) -> CompanionError {
        CompanionError::Upstream {
            service: "openai",
            status: Some(code),
            message: "boom".into(),
            retry_after_ms: None,
        }
    }

    #[test]
    fn retryable_statuses() {
        assert!(with_status(429).is_retryable());
        assert!(with_status(500).is_retryable());
        assert!(with_status(503).is_retryable());
        assert!(!with_status(400).is_retryable());
        assert!(!with_status(401).is_retryable());
    }

    #[test]
    fn transport_errors_are_retryable() {
        assert!(CompanionError::upstream("openai", "connection reset").is_retryable());
        assert!(!CompanionError::Validation("empty".into()).is_retryable());
    }

    #[test]
    fn upstream_display_includes_status() {
        let msg = with_status(502).to_string();
        assert_eq!(msg, "openai request failed with status 502: boom");

        let msg = CompanionError::upstream("huggingface", "timed out").to_string();
        assert_eq!(msg, "huggingface request failed: timed out");
    }
}
