//! A single user's conversation with the companion.

use crate::prompts;
use companion_common::Result;
use companion_llm::{ChatMessage, LlmClient, LlmConfig, LlmRequest};
use companion_memory::{
    documents_from_memories, format_context, Embedder, MemoryBuffer, MemoryConfig,
    RetrievalConfig, RetrievalIndex, RetrievalScope, SqliteStore,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Everything a chat turn needs, shared by all sessions.
pub struct ChatServices {
    pub store: SqliteStore,
    pub llm: Arc<dyn LlmClient>,
    /// `None` disables retrieval
    pub embedder: Option<Arc<dyn Embedder>>,
    pub memory: MemoryConfig,
    pub retrieval: RetrievalConfig,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ChatServices {
    pub fn new(
        store: SqliteStore,
        llm: Arc<dyn LlmClient>,
        embedder: Option<Arc<dyn Embedder>>,
        memory: MemoryConfig,
        retrieval: RetrievalConfig,
        llm_config: &LlmConfig,
    ) -> Self {
        Self {
            store,
            llm,
            embedder: embedder.filter(|_| retrieval.enabled),
            memory,
            retrieval,
            temperature: llm_config.temperature,
            max_tokens: llm_config.max_tokens,
        }
    }
}

pub struct Chatbot {
    user_name: String,
    buffer: MemoryBuffer,
    services: Arc<ChatServices>,
}

impl Chatbot {
    /// Open a session, loading the user's seeded memory.
    pub async fn load(user_name: impl Into<String>, services: Arc<ChatServices>) -> Result<Self> {
        let user_name = user_name.into();
        let buffer = services
            .store
            .load_memory(&user_name, &services.memory.persona)
            .await?;
        Ok(Self {
            user_name,
            buffer,
            services,
        })
    }

    /// Run one turn: record `input`, ask the model, record and persist the reply.
    ///
    /// Nothing is persisted when the model call fails.
    #[instrument(skip(self, input), fields(user = %self.user_name))]
    pub async fn chat(&mut self, input: &str) -> Result<String> {
        let services = Arc::clone(&self.services);

        self.buffer = services
            .store
            .load_memory(&self.user_name, &services.memory.persona)
            .await?;

        let context = self.retrieve_context(input).await;
        self.buffer.push_human(input);

        let messages: Vec<ChatMessage> = self.buffer.turns().iter().map(ChatMessage::from).collect();
        let mut request = LlmRequest::new(messages).with_system_prompt(
            prompts::chat_system_prompt(&services.memory.persona, context.as_deref()),
        );
        request.temperature = services.temperature;
        request.max_tokens = services.max_tokens;

        let response = services.llm.complete(request).await?;
        let reply = response.content;

        self.buffer.push_ai(reply.clone());
        let pruned = self.buffer.prune(services.memory.max_history_turns);
        if !pruned.is_empty() {
            debug!(pruned = pruned.len(), "Archiving oldest turns");
            services.store.archive_turns(&self.user_name, &pruned).await?;
        }
        services
            .store
            .save_memory(&self.user_name, &self.buffer)
            .await?;

        info!(
            turns = self.buffer.len(),
            retrieved = context.is_some(),
            "Chat turn complete"
        );
        Ok(reply)
    }

    /// Rebuild the index from stored and archived history and render the
    /// passages nearest to `query`. Retrieval failures are logged and the
    /// turn goes on without context.
    async fn retrieve_context(&self, query: &str) -> Option<String> {
        let embedder = self.services.embedder.as_ref()?;
        match self.search(query, embedder.as_ref()).await {
            Ok(context) => context,
            Err(e) => {
                warn!(error = %e, "Retrieval failed, answering without context");
                None
            }
        }
    }

    async fn search(&self, query: &str, embedder: &dyn Embedder) -> Result<Option<String>> {
        let config = &self.services.retrieval;
        let memories = self
            .services
            .store
            .all_memories(&self.services.memory.persona)
            .await?;
        let owner = match config.scope {
            RetrievalScope::User => Some(self.user_name.as_str()),
            RetrievalScope::All => None,
        };
        let archived = self
            .services
            .store
            .archived_turns(owner, config.max_documents)
            .await?;
        let mut documents = documents_from_memories(
            &memories,
            &archived,
            config.scope,
            &self.user_name,
            config.max_documents,
        );
        // the new input is sent as history too
        documents.retain(|d| d.content != query);

        let index = RetrievalIndex::build(documents, embedder).await?;
        let hits = index
            .search(query, config.top_k, config.min_similarity, embedder)
            .await?;
        debug!(indexed = index.len(), hits = hits.len(), "Retrieved context");

        Ok((!hits.is_empty()).then(|| format_context(&hits)))
    }
}
