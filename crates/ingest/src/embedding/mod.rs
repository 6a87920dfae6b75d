pub mod batcher;
pub mod cache;
pub mod ollama;
pub mod openai;
pub mod traits;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ragbase_core::config::{EmbeddingConfig, OllamaConfig};
use ragbase_core::ResilienceExecutor;

pub use cache::{cache_key, EmbeddingCache, InMemoryEmbeddingCache};
pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;
pub use traits::{EmbeddingBatch, EmbeddingProvider, EmbeddingResult, EmbeddingUsage};

/// Closed set of embedding backends; dispatch is exhaustively matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbeddingKind {
    Ollama,
    OpenAi,
}

impl std::str::FromStr for EmbeddingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ollama" => Ok(EmbeddingKind::Ollama),
            "openai" => Ok(EmbeddingKind::OpenAi),
            other => Err(format!("unknown embedding provider: '{other}'")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("provider not configured: {0}")]
    NotConfigured(String),
    #[error("unknown embedding provider: '{0}'")]
    UnknownProvider(String),
}

/// Build a provider from config. Strings exist only at this boundary; past
/// it, everything dispatches on [`EmbeddingKind`].
pub fn create_embedding_provider(
    embedding: &EmbeddingConfig,
    ollama: &OllamaConfig,
) -> Result<Arc<dyn EmbeddingProvider>, FactoryError> {
    let kind: EmbeddingKind = embedding
        .provider
        .parse()
        .map_err(|_| FactoryError::UnknownProvider(embedding.provider.clone()))?;

    match kind {
        EmbeddingKind::Ollama => Ok(Arc::new(OllamaEmbedder::new(
            ollama.url.clone(),
            ollama.embedding_model.clone(),
            embedding.dimensions,
            ResilienceExecutor::for_embedding(
                "ollama",
                embedding.max_retries,
                embedding.retry_delay_ms,
                embedding.timeout_ms,
            ),
        ))),
        EmbeddingKind::OpenAi => {
            let api_key = embedding
                .openai_api_key
                .clone()
                .ok_or_else(|| FactoryError::NotConfigured("OPENAI_API_KEY not set".into()))?;
            Ok(Arc::new(OpenAiEmbedder::new(
                api_key,
                embedding.openai_model.clone(),
                embedding.openai_base_url.clone(),
                embedding.dimensions,
                embedding.max_batch_size,
                ResilienceExecutor::for_embedding(
                    "openai",
                    embedding.max_retries,
                    embedding.retry_delay_ms,
                    embedding.timeout_ms,
                ),
            )))
        }
    }
}

/// Process-wide provider reuse: one instance per (kind, model).
pub struct EmbedderRegistry {
    providers: Mutex<HashMap<(EmbeddingKind, String), Arc<dyn EmbeddingProvider>>>,
}

impl EmbedderRegistry {
    pub fn new() -> Self {
        Self {
            providers: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_create(
        &self,
        embedding: &EmbeddingConfig,
        ollama: &OllamaConfig,
    ) -> Result<Arc<dyn EmbeddingProvider>, FactoryError> {
        let kind: EmbeddingKind = embedding
            .provider
            .parse()
            .map_err(|_| FactoryError::UnknownProvider(embedding.provider.clone()))?;
        let model = match kind {
            EmbeddingKind::Ollama => ollama.embedding_model.clone(),
            EmbeddingKind::OpenAi => embedding.openai_model.clone(),
        };

        let mut providers = self.providers.lock().unwrap();
        if let Some(provider) = providers.get(&(kind, model.clone())) {
            return Ok(provider.clone());
        }
        let provider = create_embedding_provider(embedding, ollama)?;
        providers.insert((kind, model), provider.clone());
        Ok(provider)
    }
}

impl Default for EmbedderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
