use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use ragbase_core::{ErrorKind, ProviderError, ResilienceExecutor};

use crate::provider::{
    ChatCompletionResponse, ChatMessage, ChunkHandler, CompletionOptions, FinishReason,
    LlmProvider, Role, StreamChunk, Usage,
};
use crate::sse::SseParser;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Google Gemini provider. Auth rides in the URL query key, per the
/// generativelanguage API.
pub struct GeminiProvider {
    client: reqwest::Client,
    executor: ResilienceExecutor,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(
        api_key: String,
        model: String,
        base_url: Option<String>,
        executor: ResilienceExecutor,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            executor,
            api_key,
            model,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    /// Gemini takes a separate `system_instruction` (all system messages
    /// concatenated), calls the assistant role `model`, and requires the
    /// conversation to open with a user turn — shimmed like Anthropic.
    fn build_request_body(messages: &[ChatMessage], options: &CompletionOptions) -> Value {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let mut contents: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::User => "user",
                        _ => "model",
                    },
                    "parts": [{ "text": m.content }],
                })
            })
            .collect();

        if contents.first().map(|c| c["role"] != "user").unwrap_or(true) {
            contents.insert(0, json!({ "role": "user", "parts": [{ "text": "." }] }));
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": options.temperature,
                "maxOutputTokens": options.max_tokens,
            },
        });
        if !system.is_empty() {
            body["system_instruction"] = json!({
                "parts": [{ "text": system.join("\n\n") }],
            });
        }
        body
    }

    async fn send_checked(
        &self,
        endpoint: &str,
        query: &str,
        body: &Value,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!(
            "{}/v1beta/models/{}:{}?key={}{}",
            self.base_url, self.model, endpoint, self.api_key, query,
        );
        debug!(model = %self.model, endpoint, "Gemini request");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("gemini", e))?;

        let status = response.status().as_u16();
        if status == 200 {
            return Ok(response);
        }
        let body_text = response.text().await.unwrap_or_default();
        Err(ProviderError::from_status("gemini", status, body_text, None))
    }

    async fn complete_once(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<ChatCompletionResponse, ProviderError> {
        let body = Self::build_request_body(messages, options);
        let response = self.send_checked("generateContent", "", &body).await?;

        let resp: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response("gemini", e.to_string()))?;

        let content = resp["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| {
                ProviderError::invalid_response(
                    "gemini",
                    "missing candidates[0].content.parts[0].text",
                )
            })?
            .to_string();

        Ok(ChatCompletionResponse {
            content,
            model: self.model.clone(),
            finish_reason: resp["candidates"][0]["finishReason"]
                .as_str()
                .and_then(map_finish_reason),
            usage: parse_usage(&resp["usageMetadata"]),
        })
    }
}

fn map_finish_reason(reason: &str) -> Option<FinishReason> {
    match reason {
        "STOP" => Some(FinishReason::Stop),
        "MAX_TOKENS" => Some(FinishReason::Length),
        "SAFETY" | "RECITATION" | "PROHIBITED_CONTENT" | "BLOCKLIST" => {
            Some(FinishReason::ContentFilter)
        }
        _ => None,
    }
}

fn parse_usage(value: &Value) -> Usage {
    Usage {
        prompt_tokens: value["promptTokenCount"].as_u64().unwrap_or(0) as u32,
        completion_tokens: value["candidatesTokenCount"].as_u64().unwrap_or(0) as u32,
        total_tokens: value["totalTokenCount"].as_u64().unwrap_or(0) as u32,
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<ChatCompletionResponse, ProviderError> {
        self.executor
            .execute(|| self.complete_once(messages, options))
            .await
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
        on_chunk: ChunkHandler<'_>,
    ) -> Result<ChatCompletionResponse, ProviderError> {
        let body = Self::build_request_body(messages, options);
        let response = self
            .executor
            .execute(|| self.send_checked("streamGenerateContent", "&alt=sse", &body))
            .await?;

        let mut parser = SseParser::new();
        let mut content = String::new();
        let mut finish_reason = None;
        let mut usage = Usage::default();

        let mut byte_stream = response.bytes_stream();
        while let Some(chunk) = byte_stream.next().await {
            let bytes =
                chunk.map_err(|e| ProviderError::new("gemini", ErrorKind::Network, e.to_string()))?;
            for event in parser.push(&bytes) {
                let value: Value = match serde_json::from_str(&event.data) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                if let Some(text) = value["candidates"][0]["content"]["parts"][0]["text"].as_str() {
                    if !text.is_empty() {
                        content.push_str(text);
                        on_chunk(StreamChunk {
                            delta: text.to_string(),
                            done: false,
                        });
                    }
                }
                if let Some(reason) = value["candidates"][0]["finishReason"].as_str() {
                    finish_reason = map_finish_reason(reason);
                }
                // The terminal fragment carries usageMetadata.
                if value["usageMetadata"].is_object() {
                    usage = parse_usage(&value["usageMetadata"]);
                }
            }
        }

        on_chunk(StreamChunk {
            delta: String::new(),
            done: true,
        });

        Ok(ChatCompletionResponse {
            content,
            model: self.model.clone(),
            finish_reason,
            usage,
        })
    }

    async fn health_check(&self) -> bool {
        let probe = self
            .client
            .get(format!(
                "{}/v1beta/models?key={}",
                self.base_url, self.api_key
            ))
            .send();
        match tokio::time::timeout(self.executor.timeout(), probe).await {
            Ok(Ok(response)) => response.status().is_success(),
            _ => false,
        }
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
