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

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: reqwest::Client,
    executor: ResilienceExecutor,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
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

    /// The Messages API takes a single top-level `system` string and requires
    /// the conversation to open with a user turn. All system-role messages
    /// are concatenated into the system field; a synthetic minimal user turn
    /// is prepended when the first remaining message is not user-role. This
    /// is a compatibility shim, not a transformation callers may rely on.
    fn build_request_body(
        model: &str,
        messages: &[ChatMessage],
        options: &CompletionOptions,
        stream: bool,
    ) -> Value {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let mut api_messages: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::User => "user",
                        _ => "assistant",
                    },
                    "content": m.content,
                })
            })
            .collect();

        if api_messages.first().map(|m| m["role"] != "user").unwrap_or(true) {
            api_messages.insert(0, json!({ "role": "user", "content": "." }));
        }

        let mut body = json!({
            "model": model,
            "messages": api_messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
        });
        if !system.is_empty() {
            body["system"] = json!(system.join("\n\n"));
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    async fn send_checked(&self, body: &Value) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        debug!(model = %self.model, url = %url, "Anthropic request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("anthropic", e))?;

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
        let body = Self::build_request_body(&self.model, messages, options, false);
        let response = self.send_checked(&body).await?;

        let resp: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response("anthropic", e.to_string()))?;

        let content = resp["content"][0]["text"]
            .as_str()
            .ok_or_else(|| ProviderError::invalid_response("anthropic", "missing content[0].text"))?
            .to_string();

        Ok(ChatCompletionResponse {
            content,
            model: resp["model"].as_str().unwrap_or(&self.model).to_string(),
            finish_reason: resp["stop_reason"].as_str().and_then(map_stop_reason),
            usage: Usage::totaled(
                resp["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32,
                resp["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32,
            ),
        })
    }
}

fn classify_error(
    status: u16,
    body: String,
    header_retry_after: Option<std::time::Duration>,
) -> ProviderError {
    if status == 429 {
        // Prefer the header; some responses carry the hint in the JSON body.
        let retry_after = header_retry_after.or_else(|| {
            serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v["error"]["retry_after_secs"].as_u64())
                .map(std::time::Duration::from_secs)
        });
        return ProviderError::new(
            "anthropic",
            ErrorKind::RateLimit {
                retry_after: retry_after.or(Some(std::time::Duration::from_secs(30))),
            },
            body,
        );
    }
    if status == 400 && (body.contains("prompt is too long") || body.contains("context window")) {
        return ProviderError::new("anthropic", ErrorKind::ContextLengthExceeded, body);
    }
    ProviderError::from_status("anthropic", status, body, None)
}

fn map_stop_reason(reason: &str) -> Option<FinishReason> {
    match reason {
        "end_turn" | "stop_sequence" => Some(FinishReason::Stop),
        "max_tokens" => Some(FinishReason::Length),
        "refusal" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

/// Mutable stream state threaded through [`apply_stream_event`].
#[derive(Default)]
struct StreamState {
    content: String,
    model: Option<String>,
    finish_reason: Option<FinishReason>,
    /// Arrives in `message_start`.
    input_tokens: u32,
    /// Arrives in `message_delta`.
    output_tokens: u32,
}

/// Fold one SSE event into the stream state; returns a content delta when
/// the event carried one.
fn apply_stream_event(
    state: &mut StreamState,
    event_type: &str,
    data: &Value,
) -> Result<Option<String>, ProviderError> {
    match event_type {
        "message_start" => {
            if let Some(model) = data["message"]["model"].as_str() {
                state.model = Some(model.to_string());
            }
            state.input_tokens = data["message"]["usage"]["input_tokens"]
                .as_u64()
                .unwrap_or(0) as u32;
        }
        "content_block_delta" => {
            if data["delta"]["type"] == "text_delta" {
                if let Some(text) = data["delta"]["text"].as_str() {
                    if !text.is_empty() {
                        state.content.push_str(text);
                        return Ok(Some(text.to_string()));
                    }
                }
            }
        }
        "message_delta" => {
            if let Some(reason) = data["delta"]["stop_reason"].as_str() {
                state.finish_reason = map_stop_reason(reason);
            }
            if let Some(tokens) = data["usage"]["output_tokens"].as_u64() {
                state.output_tokens = tokens as u32;
            }
        }
        "error" => {
            let message = data["error"]["message"]
                .as_str()
                .unwrap_or("stream error")
                .to_string();
            return Err(ProviderError::new(
                "anthropic",
                ErrorKind::InvalidResponse,
                message,
            ));
        }
        // content_block_start/stop, message_stop, ping: nothing to fold.
        _ => {}
    }
    Ok(None)
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
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
        let body = Self::build_request_body(&self.model, messages, options, true);
        let response = self.executor.execute(|| self.send_checked(&body)).await?;

        let mut parser = SseParser::new();
        let mut state = StreamState::default();

        let mut byte_stream = response.bytes_stream();
        while let Some(chunk) = byte_stream.next().await {
            let bytes = chunk
                .map_err(|e| ProviderError::new("anthropic", ErrorKind::Network, e.to_string()))?;
            for event in parser.push(&bytes) {
                let data: Value = match serde_json::from_str(&event.data) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                if let Some(delta) = apply_stream_event(&mut state, &event.event, &data)? {
                    on_chunk(StreamChunk {
                        delta,
                        done: false,
                    });
                }
            }
        }

        on_chunk(StreamChunk {
            delta: String::new(),
            done: true,
        });

        Ok(ChatCompletionResponse {
            content: state.content,
            model: state.model.unwrap_or_else(|| self.model.clone()),
            finish_reason: state.finish_reason,
            usage: Usage::totaled(state.input_tokens, state.output_tokens),
        })
    }

    async fn health_check(&self) -> bool {
        let probe = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .send();
        match tokio::time::timeout(self.executor.timeout(), probe).await {
            Ok(Ok(response)) => response.status().is_success(),
            _ => false,
        }
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}
