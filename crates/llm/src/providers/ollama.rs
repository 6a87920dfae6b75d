use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use ragbase_core::{ErrorKind, ProviderError, ResilienceExecutor};

use crate::provider::{
    ChatCompletionResponse, ChatMessage, ChunkHandler, CompletionOptions, FinishReason,
    LlmProvider, Role, StreamChunk, Usage,
};
use crate::sse::LineDecoder;

/// Ollama chat provider. Streams newline-delimited JSON, not SSE.
pub struct OllamaProvider {
    client: reqwest::Client,
    executor: ResilienceExecutor,
    url: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(url: String, model: String, executor: ResilienceExecutor) -> Self {
        Self {
            client: reqwest::Client::new(),
            executor,
            url,
            model,
        }
    }

    fn build_body(&self, messages: &[ChatMessage], options: &CompletionOptions, stream: bool) -> Value {
        let api_messages: Vec<Value> = messages
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::System => "system",
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    "content": m.content,
                })
            })
            .collect();

        json!({
            "model": self.model,
            "messages": api_messages,
            "stream": stream,
            "options": {
                "temperature": options.temperature,
                "num_predict": options.max_tokens,
            },
        })
    }

    async fn send_checked(&self, body: &Value) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/api/chat", self.url);
        debug!(model = %self.model, url = %url, "Ollama request");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("ollama", e))?;

        let status = response.status().as_u16();
        if status == 200 {
            return Ok(response);
        }
        let body_text = response.text().await.unwrap_or_default();
        Err(ProviderError::from_status("ollama", status, body_text, None))
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
            .map_err(|e| ProviderError::invalid_response("ollama", e.to_string()))?;

        let content = resp["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::invalid_response("ollama", "missing message.content"))?
            .to_string();

        Ok(ChatCompletionResponse {
            content,
            model: resp["model"].as_str().unwrap_or(&self.model).to_string(),
            finish_reason: resp["done_reason"].as_str().and_then(map_done_reason),
            usage: parse_usage(&resp),
        })
    }
}

fn map_done_reason(reason: &str) -> Option<FinishReason> {
    match reason {
        "stop" => Some(FinishReason::Stop),
        "length" => Some(FinishReason::Length),
        _ => None,
    }
}

/// Eval counters arrive on the final (`done: true`) object.
fn parse_usage(value: &Value) -> Usage {
    let prompt = value["prompt_eval_count"].as_u64().unwrap_or(0) as u32;
    let completion = value["eval_count"].as_u64().unwrap_or(0) as u32;
    Usage::totaled(prompt, completion)
}

#[async_trait]
impl LlmProvider for OllamaProvider {
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
        let response = self.executor.execute(|| self.send_checked(&body)).await?;

        let mut decoder = LineDecoder::new();
        let mut content = String::new();
        let mut model = self.model.clone();
        let mut finish_reason = None;
        let mut usage = Usage::default();

        let mut byte_stream = response.bytes_stream();
        while let Some(chunk) = byte_stream.next().await {
            let bytes =
                chunk.map_err(|e| ProviderError::new("ollama", ErrorKind::Network, e.to_string()))?;
            for line in decoder.push(&bytes) {
                if line.is_empty() {
                    continue;
                }
                let value: Value = match serde_json::from_str(&line) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                if let Some(delta) = value["message"]["content"].as_str() {
                    if !delta.is_empty() {
                        content.push_str(delta);
                        on_chunk(StreamChunk {
                            delta: delta.to_string(),
                            done: false,
                        });
                    }
                }
                if value["done"].as_bool() == Some(true) {
                    finish_reason = value["done_reason"]
                        .as_str()
                        .and_then(map_done_reason)
                        .or(Some(FinishReason::Stop));
                    usage = parse_usage(&value);
                    if let Some(m) = value["model"].as_str() {
                        model = m.to_string();
                    }
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
        let probe = self.client.get(format!("{}/api/tags", self.url)).send();
        match tokio::time::timeout(self.executor.timeout(), probe).await {
            Ok(Ok(response)) => response.status().is_success(),
            _ => false,
        }
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn provider(url: String) -> OllamaProvider {
        OllamaProvider::new(
            url,
            "llama3.2".to_string(),
            ResilienceExecutor::for_llm("ollama", 0, 1, 5_000),
        )
    }

    #[tokio::test]
    async fn complete_parses_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(200).json_body(serde_json::json!({
                    "model": "llama3.2",
                    "message": { "role": "assistant", "content": "Hi!" },
                    "done": true,
                    "done_reason": "stop",
                    "prompt_eval_count": 8,
                    "eval_count": 2
                }));
            })
            .await;

        let response = provider(server.base_url())
            .complete(&[ChatMessage::user("Hi")], &CompletionOptions::default())
            .await
            .unwrap();

        assert_eq!(response.content, "Hi!");
        assert_eq!(response.finish_reason, Some(FinishReason::Stop));
        assert_eq!(response.usage.total_tokens, 10);
    }

    #[tokio::test]
    async fn stream_parses_ndjson_lines() {
        let ndjson_body = concat!(
            "{\"model\":\"llama3.2\",\"message\":{\"content\":\"One\"},\"done\":false}\n",
            "{\"message\":{\"content\":\" two\"},\"done\":false}\n",
            "{\"message\":{\"content\":\"\"},\"done\":true,\"done_reason\":\"stop\",\"prompt_eval_count\":6,\"eval_count\":2}\n",
        );
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(200)
                    .header("content-type", "application/x-ndjson")
                    .body(ndjson_body);
            })
            .await;

        let mut deltas: Vec<String> = Vec::new();
        let mut done_count = 0;
        let response = provider(server.base_url())
            .stream(
                &[ChatMessage::user("Hi")],
                &CompletionOptions::default(),
                &mut |chunk: StreamChunk| {
                    if chunk.done {
                        done_count += 1;
                    } else {
                        deltas.push(chunk.delta);
                    }
                },
            )
            .await
            .unwrap();

        assert_eq!(deltas, vec!["One", " two"]);
        assert_eq!(done_count, 1);
        assert_eq!(response.content, "One two");
        assert_eq!(response.finish_reason, Some(FinishReason::Stop));
        assert_eq!(response.usage.prompt_tokens, 6);
        assert_eq!(response.usage.completion_tokens, 2);
    }

    #[tokio::test]
    async fn health_check_unreachable_is_false() {
        assert!(!provider("http://127.0.0.1:1".to_string()).health_check().await);
    }
}
