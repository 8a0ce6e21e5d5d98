//! Common types shared across the companion crates.
//!
//! This crate holds the chat turn representation that the memory store
//! serializes, the emotion labels produced by the classifiers, and the
//! workspace-wide error type.

pub mod emotion;
pub mod error;
pub mod message;

pub use emotion::{EmotionLabel, EmotionRecord};
pub use error::{CompanionError, Result};
pub use message::{ChatTurn, MessageKind};
