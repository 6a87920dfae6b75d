use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ragbase_core::ProviderError;

/// One embedded input. `index` ties the vector back to its position in the
/// original batch and survives sub-batching, fallback, and cache-hit paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResult {
    pub embedding: Vec<f32>,
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingUsage {
    pub prompt_tokens: u32,
    pub total_tokens: u32,
}

/// Result of an `embed_batch` call.
#[derive(Debug, Clone)]
pub struct EmbeddingBatch {
    /// In input order; `embeddings[i].index == i` always holds.
    pub embeddings: Vec<EmbeddingResult>,
    pub model: String,
    pub dimensions: usize,
    pub usage: Option<EmbeddingUsage>,
}

impl EmbeddingBatch {
    pub fn empty(model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            embeddings: Vec::new(),
            model: model.into(),
            dimensions,
            usage: None,
        }
    }
}

/// Contract for embedding backends (OpenAI, Ollama, ...).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Embed a batch, one vector per input in input order. An empty input
    /// returns an empty batch without any network call.
    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatch, ProviderError>;

    /// Lightweight reachability probe. Never errors — unreachable is `false`.
    async fn health_check(&self) -> bool;

    /// Provider name for logs and cache keys ("openai", "ollama").
    fn name(&self) -> &'static str;

    fn model(&self) -> &str;

    /// Dimensionality of the output vectors.
    fn dimensions(&self) -> usize;
}
