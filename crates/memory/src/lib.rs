//! Conversation memory for the companion backend.
//!
//! - **Buffer**: a user's ordered chat turns, always starting with the
//!   personality preamble
//! - **Store**: SQLite persistence for memory buffers, the archive of pruned
//!   turns and the append-only emotion history
//! - **Retrieval**: an index rebuilt per request from stored and archived
//!   turns, searched by cosine similarity
//!
//! ```text
//!   load_memory ──► MemoryBuffer ──► push turn ──► save_memory
//!        │                                             │
//!        ▼                                             ▼
//!   ┌──────────────────── SQLite ──────────────────────────┐
//!   │  memory(user_name UNIQUE, chat_history JSON)         │
//!   │  memory_archive(user_name, kind, content)            │
//!   │  emotion_history(user_name, emotion, timestamp)      │
//!   └──────────────────────────────────────────────────────┘
//!        │ all_memories + archived_turns
//!        ▼
//!   RetrievalIndex::build ──► search(query) ──► context block
//! ```

pub mod buffer;
pub mod embedding;
pub mod retrieval;
pub mod store;
pub mod types;

pub use buffer::MemoryBuffer;
pub use embedding::{Embedder, OpenAiEmbedder};
#[cfg(feature = "local-embeddings")]
pub use embedding::LocalEmbedder;
pub use retrieval::{
    documents_from_memories, format_context, RetrievalDocument, RetrievalHit, RetrievalIndex,
};
pub use store::SqliteStore;
pub use types::{EmbeddingConfig, MemoryConfig, Persona, RetrievalConfig, RetrievalScope};
