use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use ragbase_core::error::retry_after_from_headers;
use ragbase_core::{ProviderError, ResilienceExecutor};

use super::batcher::embed_in_sub_batches;
use super::traits::{EmbeddingBatch, EmbeddingProvider, EmbeddingResult, EmbeddingUsage};

const PROVIDER: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// OpenAI-compatible embedding backend.
pub struct OpenAiEmbedder {
    client: Client,
    executor: ResilienceExecutor,
    api_key: String,
    model: String,
    base_url: String,
    dimensions: usize,
    max_batch_size: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: String,
        model: String,
        base_url: Option<String>,
        dimensions: usize,
        max_batch_size: usize,
        executor: ResilienceExecutor,
    ) -> Self {
        Self {
            client: Client::new(),
            executor,
            api_key,
            model,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            dimensions,
            max_batch_size: max_batch_size.max(1),
        }
    }

    async fn embed_native(&self, texts: &[String]) -> Result<EmbeddingBatch, ProviderError> {
        self.executor.execute(|| self.embed_once(texts)).await
    }

    async fn embed_once(&self, texts: &[String]) -> Result<EmbeddingBatch, ProviderError> {
        let request = EmbedRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
        };

        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("openai", e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let retry_after = retry_after_from_headers(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("openai", status, body, retry_after));
        }

        let mut parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response("openai", e.to_string()))?;

        // The API may return data out of order; index restores input order.
        parsed.data.sort_by_key(|item| item.index);

        if let Some(first) = parsed.data.first() {
            if first.embedding.len() != self.dimensions {
                return Err(ProviderError::invalid_response(
                    "openai",
                    format!(
                        "dimension mismatch: expected {}, got {}",
                        self.dimensions,
                        first.embedding.len()
                    ),
                ));
            }
        }

        Ok(EmbeddingBatch {
            embeddings: parsed
                .data
                .into_iter()
                .map(|item| EmbeddingResult {
                    embedding: item.embedding,
                    index: item.index,
                    token_count: None,
                })
                .collect(),
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
            dimensions: self.dimensions,
            usage: parsed.usage.map(|u| EmbeddingUsage {
                prompt_tokens: u.prompt_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }
}

#[derive(Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedItem>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct EmbedItem {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    total_tokens: u32,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let input = [text.to_string()];
        let batch = self.embed_native(&input).await?;
        batch
            .embeddings
            .into_iter()
            .next()
            .map(|r| r.embedding)
            .ok_or_else(|| ProviderError::invalid_response("openai", "empty data array"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatch, ProviderError> {
        if texts.is_empty() {
            return Ok(EmbeddingBatch::empty(self.model.clone(), self.dimensions));
        }
        if texts.len() <= self.max_batch_size {
            return self.embed_native(texts).await;
        }
        embed_in_sub_batches(texts, self.max_batch_size, |sub| async move {
            self.embed_native(&sub).await
        })
        .await
    }

    async fn health_check(&self) -> bool {
        let probe = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send();
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

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn embedder(url: String, max_batch_size: usize) -> OpenAiEmbedder {
        OpenAiEmbedder::new(
            "sk-test".to_string(),
            "text-embedding-3-small".to_string(),
            Some(url),
            1,
            max_batch_size,
            ResilienceExecutor::for_embedding("openai", 0, 1, 5_000),
        )
    }

    #[test]
    fn retry_after_header_parses_seconds() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("retry-after", "7".parse().unwrap());
        assert_eq!(
            retry_after_from_headers(&headers),
            Some(Duration::from_secs(7))
        );

        headers.insert("retry-after", "soon".parse().unwrap());
        assert_eq!(retry_after_from_headers(&headers), None);
    }

    #[tokio::test]
    async fn oversized_batch_splits_and_keeps_order() {
        let server = MockServer::start_async().await;
        let texts: Vec<String> = (0..5).map(|i| format!("t{i}")).collect();

        // One mock per expected sub-batch of two (plus the remainder).
        for sub in texts.chunks(2) {
            let data: Vec<_> = sub
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    let value: f32 = t.trim_start_matches('t').parse().unwrap();
                    json!({ "embedding": [value], "index": i })
                })
                .collect();
            let expected = json!({ "model": "text-embedding-3-small", "input": sub });
            server
                .mock_async(move |when, then| {
                    when.method(POST).path("/v1/embeddings").json_body(expected);
                    then.status(200).json_body(json!({
                        "data": data,
                        "model": "text-embedding-3-small",
                        "usage": { "prompt_tokens": sub.len(), "total_tokens": sub.len() }
                    }));
                })
                .await;
        }

        let batch = embedder(server.base_url(), 2)
            .embed_batch(&texts)
            .await
            .unwrap();

        let indices: Vec<usize> = batch.embeddings.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        for (i, result) in batch.embeddings.iter().enumerate() {
            assert_eq!(result.embedding, vec![i as f32]);
        }
        assert_eq!(batch.usage.unwrap().total_tokens, 5);
    }

    #[tokio::test]
    async fn auth_error_is_fatal_and_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(401).body("invalid api key");
            })
            .await;

        let embedder = OpenAiEmbedder::new(
            "sk-bad".to_string(),
            "text-embedding-3-small".to_string(),
            Some(server.base_url()),
            1,
            2048,
            ResilienceExecutor::for_embedding("openai", 3, 1, 5_000),
        );
        let texts: Vec<String> = vec!["a".into()];
        let err = embedder.embed_batch(&texts).await.unwrap_err();

        assert_eq!(err.code(), "AUTH_ERROR");
        assert!(!err.retryable());
        // Fatal errors short-circuit: exactly one attempt.
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn server_errors_retry_up_to_budget() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(503).body("overloaded");
            })
            .await;

        let embedder = OpenAiEmbedder::new(
            "sk-test".to_string(),
            "text-embedding-3-small".to_string(),
            Some(server.base_url()),
            1,
            2048,
            ResilienceExecutor::for_embedding("openai", 2, 1, 5_000),
        );
        let texts: Vec<String> = vec!["a".into()];
        let err = embedder.embed_batch(&texts).await.unwrap_err();

        assert_eq!(err.code(), "MAX_RETRIES_EXCEEDED");
        mock.assert_hits_async(3).await;
    }

    #[tokio::test]
    async fn health_check_unreachable_is_false() {
        let embedder = embedder("http://127.0.0.1:1".to_string(), 2048);
        assert!(!embedder.health_check().await);
    }
}
