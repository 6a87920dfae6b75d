use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use ragbase_core::{ProviderError, ResilienceExecutor};

use super::traits::{EmbeddingBatch, EmbeddingProvider, EmbeddingResult, EmbeddingUsage};

const PROVIDER: &str = "ollama";

/// Embedder backed by a local Ollama instance.
///
/// The batch path uses the native `/api/embed` endpoint; single embeds go
/// through the legacy `/api/embeddings` endpoint, which also serves as the
/// sequential fallback when a batch call fails.
pub struct OllamaEmbedder {
    client: Client,
    executor: ResilienceExecutor,
    url: String,
    model: String,
    dimensions: usize,
}

impl OllamaEmbedder {
    pub fn new(url: String, model: String, dimensions: usize, executor: ResilienceExecutor) -> Self {
        Self {
            client: Client::new(),
            executor,
            url,
            model,
            dimensions,
        }
    }

    async fn embed_batch_once(&self, texts: &[String]) -> Result<EmbeddingBatch, ProviderError> {
        let request = OllamaBatchRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
        };

        let response = self
            .client
            .post(format!("{}/api/embed", self.url))
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("ollama", e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("ollama", status, body, None));
        }

        let parsed: OllamaBatchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response("ollama", e.to_string()))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(ProviderError::invalid_response(
                "ollama",
                format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    parsed.embeddings.len()
                ),
            ));
        }

        Ok(EmbeddingBatch {
            embeddings: parsed
                .embeddings
                .into_iter()
                .enumerate()
                .map(|(index, embedding)| EmbeddingResult {
                    embedding,
                    index,
                    token_count: None,
                })
                .collect(),
            model: self.model.clone(),
            dimensions: self.dimensions,
            usage: parsed.prompt_eval_count.map(|n| EmbeddingUsage {
                prompt_tokens: n,
                total_tokens: n,
            }),
        })
    }

    async fn embed_single_once(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let request = OllamaSingleRequest {
            model: self.model.clone(),
            prompt: text.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.url))
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("ollama", e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("ollama", status, body, None));
        }

        let parsed: OllamaSingleResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response("ollama", e.to_string()))?;
        Ok(parsed.embedding)
    }

    /// One `embed` call per text, assembled back into a batch. Each call
    /// carries its own retry budget.
    async fn embed_sequential(&self, texts: &[String]) -> Result<EmbeddingBatch, ProviderError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for (index, text) in texts.iter().enumerate() {
            let embedding = self.embed(text).await?;
            embeddings.push(EmbeddingResult {
                embedding,
                index,
                token_count: None,
            });
        }
        Ok(EmbeddingBatch {
            embeddings,
            model: self.model.clone(),
            dimensions: self.dimensions,
            usage: None,
        })
    }
}

#[derive(Serialize)]
struct OllamaBatchRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct OllamaBatchResponse {
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
}

#[derive(Serialize)]
struct OllamaSingleRequest {
    model: String,
    prompt: String,
}

#[derive(Deserialize)]
struct OllamaSingleResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.executor.execute(|| self.embed_single_once(text)).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatch, ProviderError> {
        if texts.is_empty() {
            return Ok(EmbeddingBatch::empty(self.model.clone(), self.dimensions));
        }

        match self.executor.execute(|| self.embed_batch_once(texts)).await {
            Ok(batch) => Ok(batch),
            Err(err) => {
                // Batch endpoint unavailable or failing: degrade to one call
                // per text rather than failing the whole batch.
                warn!(
                    provider = PROVIDER,
                    error = %err,
                    count = texts.len(),
                    "native batch embed failed, falling back to sequential"
                );
                self.embed_sequential(texts).await
            }
        }
    }

    async fn health_check(&self) -> bool {
        let probe = self.client.get(format!("{}/api/tags", self.url)).send();
        match tokio::time::timeout(self.executor.timeout(), probe).await {
            Ok(Ok(response)) => response.status().is_success(),
            _ => false,
        }
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
