//! Emotion classification for the companion backend.
//!
//! Two interchangeable classifiers map free text onto an [`EmotionLabel`]:
//! a hosted star-rating sentiment model ([`HuggingFaceClassifier`]) and a
//! prompt against the chat model ([`LlmEmotionClassifier`]). Both go through
//! the same "N stars" mapping. [`StreakDetector`] looks at the stored history
//! for runs of negative emotion.

pub mod classifier;
pub mod config;
pub mod huggingface;
pub mod llm;
pub mod streak;

pub use classifier::{classify_or_neutral, EmotionClassifier, RetryingClassifier};
pub use config::{build_classifier, ClassifierConfig};
pub use huggingface::HuggingFaceClassifier;
pub use llm::LlmEmotionClassifier;
pub use streak::{StreakConfig, StreakDetector, SupportWarning};

pub use companion_common::EmotionLabel;
