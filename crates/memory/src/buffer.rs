//! The per-user memory buffer and its stored JSON form.

use crate::types::Persona;
use companion_common::{ChatTurn, MessageKind, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Ordered chat turns for one user.
///
/// A buffer handed out by this crate always begins with the personality
/// preamble (a system turn followed by the companion's intro).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBuffer {
    turns: Vec<ChatTurn>,
}

/// Stored entry with the tag still unchecked, so unknown kinds can be skipped.
#[derive(Deserialize)]
struct RawTurn {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: String,
}

impl MemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh buffer holding only the preamble.
    pub fn seeded(persona: &Persona) -> Self {
        let mut buffer = Self::new();
        buffer.seed_personality(persona);
        buffer
    }

    pub fn from_turns(turns: Vec<ChatTurn>) -> Self {
        Self { turns }
    }

    /// Insert the preamble at the front unless a system turn is already present.
    ///
    /// Returns `true` when the preamble was inserted.
    pub fn seed_personality(&mut self, persona: &Persona) -> bool {
        if self.turns.iter().any(ChatTurn::is_system) {
            return false;
        }
        self.turns.splice(
            0..0,
            [
                ChatTurn::system(persona.system_label.clone()),
                ChatTurn::ai(persona.intro.clone()),
            ],
        );
        true
    }

    /// Parse the stored JSON array and seed the result.
    ///
    /// Unknown turn types are dropped. Malformed JSON yields a buffer holding
    /// only the preamble.
    pub fn decode(json: &str, persona: &Persona) -> Self {
        let turns = match serde_json::from_str::<Vec<RawTurn>>(json) {
            Ok(raw) => raw
                .into_iter()
                .filter_map(|r| match MessageKind::from_tag(&r.kind) {
                    Some(kind) => Some(ChatTurn {
                        kind,
                        content: r.content,
                    }),
                    None => {
                        warn!(kind = %r.kind, "Dropping stored turn of unknown type");
                        None
                    }
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "Stored chat history is not valid JSON, starting over");
                Vec::new()
            }
        };

        let mut buffer = Self { turns };
        buffer.seed_personality(persona);
        buffer
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.turns)?)
    }

    pub fn push_human(&mut self, content: impl Into<String>) {
        self.turns.push(ChatTurn::human(content));
    }

    pub fn push_ai(&mut self, content: impl Into<String>) {
        self.turns.push(ChatTurn::ai(content));
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last_ai(&self) -> Option<&ChatTurn> {
        self.turns.iter().rev().find(|t| t.kind == MessageKind::Ai)
    }

    /// Turns after the preamble that are not system turns.
    pub fn conversation_turns(&self) -> impl Iterator<Item = &ChatTurn> {
        self.turns[self.preamble_len()..]
            .iter()
            .filter(|t| !t.is_system())
    }

    fn preamble_len(&self) -> usize {
        match self.turns.as_slice() {
            [first, second, ..] if first.is_system() && second.kind == MessageKind::Ai => 2,
            [first, ..] if first.is_system() => 1,
            _ => 0,
        }
    }

    /// Drop the oldest conversation turns so at most `max_turns` remain.
    ///
    /// The preamble and system turns are never pruned; `max_turns == 0`
    /// disables pruning. Returns the removed turns, oldest first.
    pub fn prune(&mut self, max_turns: usize) -> Vec<ChatTurn> {
        let preamble = self.preamble_len();
        let conversation = self.turns[preamble..]
            .iter()
            .filter(|t| !t.is_system())
            .count();

        if max_turns == 0 || conversation <= max_turns {
            return Vec::new();
        }

        let mut excess = conversation - max_turns;
        let mut removed = Vec::with_capacity(excess);
        let mut kept = Vec::with_capacity(self.turns.len() - excess);
        for (index, turn) in std::mem::take(&mut self.turns).into_iter().enumerate() {
            if index < preamble || turn.is_system() || excess == 0 {
                kept.push(turn);
            } else {
                excess -= 1;
                removed.push(turn);
            }
        }
        self.turns = kept;
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persona() -> Persona {
        Persona {
            system_label: "Base settings".into(),
            intro: "Hi, I'm your companion.".into(),
        }
    }

    #[test]
    fn seeding_inserts_preamble_at_front() {
        let mut buffer = MemoryBuffer::from_turns(vec![ChatTurn::human("hello")]);
        assert!(buffer.seed_personality(&persona()));

        assert_eq!(buffer.turns()[0], ChatTurn::system("Base settings"));
        assert_eq!(buffer.turns()[1], ChatTurn::ai("Hi, I'm your companion."));
        assert_eq!(buffer.turns()[2], ChatTurn::human("hello"));
    }

    #[test]
    fn seeding_is_idempotent() {
        let mut buffer = MemoryBuffer::seeded(&persona());
        assert!(!buffer.seed_personality(&persona()));
        assert!(!buffer.seed_personality(&persona()));

        let systems = buffer.turns().iter().filter(|t| t.is_system()).count();
        assert_eq!(systems, 1);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn existing_system_turn_blocks_seeding() {
        let mut buffer = MemoryBuffer::from_turns(vec![
            ChatTurn::system("custom"),
            ChatTurn::human("hey"),
        ]);
        assert!(!buffer.seed_personality(&persona()));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn decode_stored_history() {
        let json = r#"[
            {"type": "SystemMessage", "content": "Base settings"},
            {"type": "AIMessage", "content": "Hi, I'm your companion."},
            {"type": "HumanMessage", "content": "I had a rough day"},
            {"type": "AIMessage", "content": "I'm sorry, want to talk about it?"}
        ]"#;
        let buffer = MemoryBuffer::decode(json, &persona());

        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.turns()[2], ChatTurn::human("I had a rough day"));
        assert_eq!(
            buffer.last_ai().map(|t| t.content.as_str()),
            Some("I'm sorry, want to talk about it?")
        );
    }

    #[test]
    fn decode_drops_unknown_types_and_seeds() {
        let json = r#"[
            {"type": "HumanMessage", "content": "hello"},
            {"type": "FunctionMessage", "content": "{}"}
        ]"#;
        let buffer = MemoryBuffer::decode(json, &persona());

        assert_eq!(buffer.len(), 3);
        assert!(buffer.turns()[0].is_system());
        assert_eq!(buffer.turns()[2], ChatTurn::human("hello"));
    }

    #[test]
    fn decode_malformed_json_resets_to_preamble() {
        let buffer = MemoryBuffer::decode("[{'type': oops", &persona());
        assert_eq!(buffer, MemoryBuffer::seeded(&persona()));
    }

    #[test]
    fn encode_decode_preserves_turns() {
        let mut buffer = MemoryBuffer::seeded(&persona());
        buffer.push_human("what's up");
        buffer.push_ai("not much!");

        let json = buffer.encode().unwrap();
        assert!(json.contains(r#""type":"HumanMessage""#));
        assert_eq!(MemoryBuffer::decode(&json, &persona()), buffer);
    }

    #[test]
    fn prune_keeps_preamble_and_newest_turns() {
        let mut buffer = MemoryBuffer::seeded(&persona());
        for i in 0..5 {
            buffer.push_human(format!("q{i}"));
            buffer.push_ai(format!("a{i}"));
        }

        let removed = buffer.prune(4);
        assert_eq!(removed.len(), 6);
        assert_eq!(removed[0], ChatTurn::human("q0"));
        assert_eq!(removed[5], ChatTurn::ai("a2"));
        assert_eq!(buffer.len(), 6);
        assert_eq!(buffer.turns()[0], ChatTurn::system("Base settings"));
        assert_eq!(buffer.turns()[1], ChatTurn::ai("Hi, I'm your companion."));
        assert_eq!(buffer.turns()[2], ChatTurn::human("q3"));
        assert_eq!(buffer.turns()[5], ChatTurn::ai("a4"));
    }

    #[test]
    fn prune_zero_is_unbounded() {
        let mut buffer = MemoryBuffer::seeded(&persona());
        for i in 0..10 {
            buffer.push_human(format!("q{i}"));
        }
        assert!(buffer.prune(0).is_empty());
        assert_eq!(buffer.len(), 12);
    }

    #[test]
    fn conversation_turns_skip_preamble() {
        let mut buffer = MemoryBuffer::seeded(&persona());
        buffer.push_human("hi");
        buffer.push_ai("hello!");

        let contents: Vec<&str> = buffer
            .conversation_turns()
            .map(|t| t.content.as_str())
            .collect();
        assert_eq!(contents, vec!["hi", "hello!"]);
    }
}
