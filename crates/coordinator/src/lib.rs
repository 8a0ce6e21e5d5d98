//! Companion coordinator.
//!
//! Ties the pieces together for each request:
//!
//! ```text
//!   message
//!      │
//!      ▼
//! ┌─────────────┐   label    ┌──────────────────┐
//! │ Classifier  │ ─────────► │ emotion_history  │
//! └─────────────┘            └────────┬─────────┘
//!                                     │ recent N
//!                                     ▼
//!                             ┌───────────────┐
//!                             │ StreakDetector│ ──► warning
//!                             └───────┬───────┘
//!                                     ▼
//! ┌─────────────┐  context   ┌───────────────┐   reply
//! │ Retrieval   │ ─────────► │   Chatbot     │ ─────────► memory
//! └─────────────┘            └───────────────┘
//! ```

pub mod chatbot;
pub mod config;
pub mod coordinator;
pub mod prompts;

pub use chatbot::{ChatServices, Chatbot};
pub use config::{CompanionConfig, EmotionsConfig, ServerConfig};
pub use coordinator::{ChatOutcome, Coaching, Coordinator, EmotionAnalysis};
