//! Chat turn types stored in a user's memory buffer.

use serde::{Deserialize, Serialize};

/// Kind of a stored chat turn.
///
/// The serialized tags are part of the stored format and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    #[serde(rename = "SystemMessage")]
    System,
    #[serde(rename = "HumanMessage")]
    Human,
    #[serde(rename = "AIMessage")]
    Ai,
}

impl MessageKind {
    pub fn tag(self) -> &'static str {
        match self {
            MessageKind::System => "SystemMessage",
            MessageKind::Human => "HumanMessage",
            MessageKind::Ai => "AIMessage",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "SystemMessage" => Some(MessageKind::System),
            "HumanMessage" => Some(MessageKind::Human),
            "AIMessage" => Some(MessageKind::Ai),
            _ => None,
        }
    }
}

/// One turn of a conversation, as persisted: `{"type": ..., "content": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::System,
            content: content.into(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Human,
            content: content.into(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Ai,
            content: content.into(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.kind == MessageKind::System
    }
}
