//! Ephemeral vector index over stored chat turns.
//!
//! The index is rebuilt from the store on each request; nothing is cached
//! between requests.

use crate::buffer::MemoryBuffer;
use crate::embedding::Embedder;
use crate::types::RetrievalScope;
use companion_common::{ChatTurn, CompanionError, MessageKind, Result};
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

/// One indexed passage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalDocument {
    pub user_name: String,
    pub kind: MessageKind,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalHit {
    pub document: RetrievalDocument,
    pub score: f32,
}

/// Turn stored history into documents, one per conversation turn.
///
/// `user_name`'s live buffer is already sent to the model as history, so it
/// is never indexed, and neither is any passage repeating one of its turns.
/// [`RetrievalScope::User`] indexes only `user_name`'s archived turns;
/// [`RetrievalScope::All`] indexes every archive plus the other users' live
/// buffers. When more than `max_documents` remain, the oldest are dropped.
pub fn documents_from_memories(
    memories: &[(String, MemoryBuffer)],
    archived: &[(String, ChatTurn)],
    scope: RetrievalScope,
    user_name: &str,
    max_documents: usize,
) -> Vec<RetrievalDocument> {
    let live: HashSet<&str> = memories
        .iter()
        .filter(|(owner, _)| owner == user_name)
        .flat_map(|(_, buffer)| buffer.conversation_turns())
        .map(|turn| turn.content.as_str())
        .collect();

    let archived = archived
        .iter()
        .filter(|(owner, _)| scope == RetrievalScope::All || owner == user_name)
        .map(|(owner, turn)| (owner, turn));
    let others = memories
        .iter()
        .filter(|(owner, _)| scope == RetrievalScope::All && owner != user_name)
        .flat_map(|(owner, buffer)| buffer.conversation_turns().map(move |turn| (owner, turn)));

    let mut documents: Vec<RetrievalDocument> = archived
        .chain(others)
        .filter(|(_, turn)| !turn.is_system() && !turn.content.trim().is_empty())
        .filter(|(_, turn)| !live.contains(turn.content.as_str()))
        .map(|(owner, turn)| RetrievalDocument {
            user_name: owner.clone(),
            kind: turn.kind,
            content: turn.content.clone(),
        })
        .collect();

    if max_documents > 0 && documents.len() > max_documents {
        let excess = documents.len() - max_documents;
        documents.drain(..excess);
    }
    documents
}

pub struct RetrievalIndex {
    documents: Vec<RetrievalDocument>,
    vectors: Vec<Vec<f32>>,
}

impl RetrievalIndex {
    pub fn empty() -> Self {
        Self {
            documents: Vec::new(),
            vectors: Vec::new(),
        }
    }

    /// Embed every document in one batch. No embedding call for an empty set.
    pub async fn build(documents: Vec<RetrievalDocument>, embedder: &dyn Embedder) -> Result<Self> {
        if documents.is_empty() {
            return Ok(Self::empty());
        }

        let texts: Vec<&str> = documents.iter().map(|d| d.content.as_str()).collect();
        let vectors = embedder.embed_batch(&texts).await?;
        if vectors.len() != documents.len() {
            return Err(CompanionError::Embedding(format!(
                "Embedder returned {} vectors for {} documents",
                vectors.len(),
                documents.len()
            )));
        }

        debug!(documents = documents.len(), "Built retrieval index");
        Ok(Self { documents, vectors })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Nearest documents to `query` by cosine similarity, best first.
    ///
    /// Hits below `min_similarity` are discarded; equal scores keep index order.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        min_similarity: f32,
        embedder: &dyn Embedder,
    ) -> Result<Vec<RetrievalHit>> {
        if self.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = embedder.embed(query).await?;
        Ok(self.rank(&query_vector, top_k, min_similarity))
    }

    fn rank(&self, query_vector: &[f32], top_k: usize, min_similarity: f32) -> Vec<RetrievalHit> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(query_vector, v)))
            .filter(|(_, score)| *score >= min_similarity)
            .collect();

        // stable sort keeps insertion order among ties
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(i, score)| RetrievalHit {
                document: self.documents[i].clone(),
                score,
            })
            .collect()
    }
}

/// Render hits as a context block for the system prompt.
pub fn format_context(hits: &[RetrievalHit]) -> String {
    hits.iter()
        .map(|hit| {
            let speaker = match hit.document.kind {
                MessageKind::Human => hit.document.user_name.as_str(),
                MessageKind::Ai => "companion",
                MessageKind::System => "system",
            };
            format!("- {}: {}", speaker, hit.document.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
