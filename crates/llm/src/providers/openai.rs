use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use ragbase_core::error::retry_after_from_headers;
use ragbase_core::{ErrorKind, ProviderError, ResilienceExecutor};

use crate::provider::{
    ChatCompletionResponse, ChatMessage, ChunkHandler, CompletionOptions, FinishReason,
    LlmProvider, Role, StreamChunk, Usage,
};
use crate::sse::SseParser;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiProvider {
    client: reqwest::Client,
    executor: ResilienceExecutor,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
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

    /// Roles and optional participant names pass through near-verbatim.
    fn build_messages(messages: &[ChatMessage]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| {
                let mut msg = json!({
                    "role": match m.role {
                        Role::System => "system",
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    "content": m.content,
                });
                if let Some(name) = &m.name {
                    msg["name"] = json!(name);
                }
                msg
            })
            .collect()
    }

    fn build_body(&self, messages: &[ChatMessage], options: &CompletionOptions, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": Self::build_messages(messages),
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
        });
        if stream {
            body["stream"] = json!(true);
            // Usage arrives in one final chunk only when asked for.
            body["stream_options"] = json!({ "include_usage": true });
        }
        body
    }

    async fn send_checked(&self, body: &Value) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        debug!(model = %self.model, url = %url, "OpenAI request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("openai", e))?;

        let status = response.status().as_u16();
        if status == 200 {
            return Ok(response);
        }
        let retry_after = retry_after_from_headers(response.headers());
        let body_text = response.text().await.unwrap_or_default();
        Err(classify_error(status, body_text, retry_after))
    }

    async fn complete_once(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<ChatCompletionResponse, ProviderError> {
        let body = self.build_body(messages, options, false);
        let response = self.send_checked(&body).await?;

        let resp: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response("openai", e.to_string()))?;

        let content = resp["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                ProviderError::invalid_response("openai", "missing choices[0].message.content")
            })?
            .to_string();

        Ok(ChatCompletionResponse {
            content,
            model: resp["model"].as_str().unwrap_or(&self.model).to_string(),
            finish_reason: resp["choices"][0]["finish_reason"]
                .as_str()
                .and_then(map_finish_reason),
            usage: parse_usage(&resp["usage"]),
        })
    }
}

fn classify_error(
    status: u16,
    body: String,
    retry_after: Option<std::time::Duration>,
) -> ProviderError {
    if status == 400 && body.contains("context_length_exceeded") {
        return ProviderError::new("openai", ErrorKind::ContextLengthExceeded, body);
    }
    ProviderError::from_status("openai", status, body, retry_after)
}

fn map_finish_reason(reason: &str) -> Option<FinishReason> {
    match reason {
        "stop" => Some(FinishReason::Stop),
        "length" => Some(FinishReason::Length),
        "content_filter" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

#[derive(Default)]
struct StreamState {
    content: String,
    model: Option<String>,
    finish_reason: Option<FinishReason>,
    usage: Usage,
}

/// Fold one stream fragment into the state; returns a content delta when the
/// fragment carried one. `[DONE]` markers never reach this function.
fn apply_stream_value(state: &mut StreamState, value: &Value) -> Option<String> {
    let mut delta_out = None;
    if let Some(delta) = value["choices"][0]["delta"]["content"].as_str() {
        if !delta.is_empty() {
            state.content.push_str(delta);
            delta_out = Some(delta.to_string());
        }
    }
    if let Some(reason) = value["choices"][0]["finish_reason"].as_str() {
        state.finish_reason = map_finish_reason(reason);
    }
    if value["usage"].is_object() {
        state.usage = parse_usage(&value["usage"]);
    }
    if let Some(m) = value["model"].as_str() {
        state.model = Some(m.to_string());
    }
    delta_out
}

fn parse_usage(value: &Value) -> Usage {
    Usage {
        prompt_tokens: value["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        completion_tokens: value["completion_tokens"].as_u64().unwrap_or(0) as u32,
        total_tokens: value["total_tokens"].as_u64().unwrap_or(0) as u32,
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
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
        let body = self.build_body(messages, options, true);
        // Retry covers connection and status; a stream already delivering
        // deltas must not replay into the callback.
        let response = self.executor.execute(|| self.send_checked(&body)).await?;

        let mut parser = SseParser::new();
        let mut content = String::new();
        let mut model = self.model.clone();
        let mut finish_reason = None;
        let mut usage = Usage::default();

        let mut byte_stream = response.bytes_stream();
        while let Some(chunk) = byte_stream.next().await {
            let bytes =
                chunk.map_err(|e| ProviderError::new("openai", ErrorKind::Network, e.to_string()))?;
            for event in parser.push(&bytes) {
                if event.data == "[DONE]" {
                    continue;
                }
                let value: Value = match serde_json::from_str(&event.data) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                if let Some(delta) = value["choices"][0]["delta"]["content"].as_str() {
                    if !delta.is_empty() {
                        content.push_str(delta);
                        on_chunk(StreamChunk {
                            delta: delta.to_string(),
                            done: false,
                        });
                    }
                }
                if let Some(reason) = value["choices"][0]["finish_reason"].as_str() {
                    finish_reason = map_finish_reason(reason);
                }
                if value["usage"].is_object() {
                    usage = parse_usage(&value["usage"]);
                }
                if let Some(m) = value["model"].as_str() {
                    model = m.to_string();
                }
            }
        }

        on_chunk(StreamChunk {
            delta: String::new(),
            done: true,
        });

        Ok(ChatCompletionResponse {
            content,
            model,
            finish_reason,
            usage,
        })
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
        "openai"
    }
}
