//! Retrieval and chat services composed from injected collaborators.
//!
//! Services are plain constructed values; the composition root decides their
//! lifetime. Nothing here is a process-wide singleton.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use ragbase_core::ProviderError;
use ragbase_ingest::embedding::{cache_key, EmbeddingCache};
use ragbase_ingest::{ChunkRecord, EmbeddingBatch, EmbeddingProvider, EmbeddingResult};
use ragbase_llm::{ChatCompletionResponse, ChatMessage, CompletionOptions, LlmProvider};

use crate::prompt;
use crate::store::{agent_collection, ScoredPoint, SearchParams, StoreError, VectorPoint, VectorStore};

#[derive(Debug, Error)]
pub enum RagError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("vector store: {0}")]
    Store(#[from] StoreError),
}

impl RagError {
    pub fn retryable(&self) -> bool {
        match self {
            RagError::Provider(err) => err.retryable(),
            RagError::Store(_) => true,
        }
    }
}

// ── Embedding service ───────────────────────────────────────────────────────

/// Cache-aware front for an [`EmbeddingProvider`].
///
/// Output order always matches input order: original indices are carried
/// through the cache partition and restored in the merge, whatever mix of
/// hits and misses a batch produces.
pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Option<Arc<dyn EmbeddingCache>>,
}

impl EmbeddingService {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, cache: Option<Arc<dyn EmbeddingCache>>) -> Self {
        Self { provider, cache }
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Embed a single query string, consulting the cache first.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let Some(cache) = &self.cache else {
            return self.provider.embed(text).await;
        };

        let key = cache_key(self.provider.name(), text);
        if let Some(hit) = cache.get(&key) {
            return Ok(hit);
        }
        let vector = self.provider.embed(text).await?;
        cache.set(&key, vector.clone());
        Ok(vector)
    }

    /// Embed a batch, serving what it can from the cache and sending only
    /// the misses to the provider.
    pub async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingBatch, ProviderError> {
        if texts.is_empty() {
            return Ok(EmbeddingBatch::empty(
                self.provider.model(),
                self.provider.dimensions(),
            ));
        }
        let Some(cache) = &self.cache else {
            return self.provider.embed_batch(texts).await;
        };

        let mut hits: Vec<EmbeddingResult> = Vec::new();
        let mut miss_indices: Vec<usize> = Vec::new();
        let mut miss_texts: Vec<String> = Vec::new();
        for (index, text) in texts.iter().enumerate() {
            match cache.get(&cache_key(self.provider.name(), text)) {
                Some(embedding) => hits.push(EmbeddingResult {
                    embedding,
                    index,
                    token_count: None,
                }),
                None => {
                    miss_indices.push(index);
                    miss_texts.push(text.clone());
                }
            }
        }

        if miss_texts.is_empty() {
            return Ok(EmbeddingBatch {
                embeddings: hits,
                model: self.provider.model().to_string(),
                dimensions: self.provider.dimensions(),
                usage: None,
            });
        }

        debug!(
            total = texts.len(),
            cached = hits.len(),
            misses = miss_texts.len(),
            "embedding batch with partial cache hits"
        );

        let miss_batch = self.provider.embed_batch(&miss_texts).await?;
        let mut merged = hits;
        for result in miss_batch.embeddings {
            // Miss-batch indices are positions within the miss list; map them
            // back to the caller's positions before merging.
            let original = miss_indices[result.index];
            cache.set(
                &cache_key(self.provider.name(), &texts[original]),
                result.embedding.clone(),
            );
            merged.push(EmbeddingResult {
                embedding: result.embedding,
                index: original,
                token_count: result.token_count,
            });
        }
        merged.sort_by_key(|r| r.index);

        Ok(EmbeddingBatch {
            embeddings: merged,
            model: miss_batch.model,
            dimensions: miss_batch.dimensions,
            usage: miss_batch.usage,
        })
    }
}

/// Embed chunk contents and upsert them into the agent's collection.
///
/// Returns the number of points written. Point payloads carry the chunk
/// content, its index, and whatever metadata the chunker attached.
pub async fn index_chunks(
    embedding: &EmbeddingService,
    store: &dyn VectorStore,
    agent_id: &str,
    chunks: &[ChunkRecord],
) -> Result<usize, RagError> {
    if chunks.is_empty() {
        return Ok(0);
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let batch = embedding.embed_texts(&texts).await?;

    let points: Vec<VectorPoint> = batch
        .embeddings
        .into_iter()
        .map(|result| {
            let chunk = &chunks[result.index];
            let mut payload = serde_json::to_value(&chunk.metadata)
                .unwrap_or_else(|_| serde_json::json!({}));
            if let Some(map) = payload.as_object_mut() {
                map.insert("content".into(), chunk.content.clone().into());
                map.insert("chunk_index".into(), result.index.into());
                map.insert("token_count".into(), chunk.token_count.into());
            }
            VectorPoint {
                id: Uuid::new_v4(),
                vector: result.embedding,
                payload,
            }
        })
        .collect();

    let written = points.len();
    store.upsert(&agent_collection(agent_id), points).await?;
    Ok(written)
}

// ── RAG service ─────────────────────────────────────────────────────────────

/// End-to-end retrieval and chat composition.
pub struct RagService {
    embedding: Arc<EmbeddingService>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn LlmProvider>,
}

impl RagService {
    pub fn new(
        embedding: Arc<EmbeddingService>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn LlmProvider>,
    ) -> Self {
        Self {
            embedding,
            store,
            llm,
        }
    }

    /// Embed the query and search the agent's collection.
    pub async fn retrieve(
        &self,
        agent_id: &str,
        query: &str,
        params: &SearchParams,
    ) -> Result<Vec<ScoredPoint>, RagError> {
        let vector = self.embedding.embed_query(query).await?;
        let hits = self
            .store
            .search(&agent_collection(agent_id), &vector, params)
            .await?;
        debug!(agent_id, hits = hits.len(), "retrieved context");
        Ok(hits)
    }

    /// Retrieve context for `question` and complete a chat turn over it.
    pub async fn chat(
        &self,
        agent_id: &str,
        question: &str,
        history: &[ChatMessage],
        params: &SearchParams,
        options: &CompletionOptions,
    ) -> Result<ChatCompletionResponse, RagError> {
        let context = self.retrieve(agent_id, question, params).await?;
        let messages = prompt::compose_messages(question, history, &context);
        Ok(self.llm.complete(&messages, options).await?)
    }

    /// Streaming variant of [`chat`](Self::chat); deltas go to `on_chunk`.
    pub async fn chat_stream(
        &self,
        agent_id: &str,
        question: &str,
        history: &[ChatMessage],
        params: &SearchParams,
        options: &CompletionOptions,
        on_chunk: ragbase_llm::provider::ChunkHandler<'_>,
    ) -> Result<ChatCompletionResponse, RagError> {
        let context = self.retrieve(agent_id, question, params).await?;
        let messages = prompt::compose_messages(question, history, &context);
        Ok(self.llm.stream(&messages, options, on_chunk).await?)
    }
}
