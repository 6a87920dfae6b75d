use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ragbase_core::ProviderError;

/// A chat message for the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            name: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            name: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 4096,
        }
    }
}

/// Vendor finish reasons normalized to a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn totaled(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatCompletionResponse {
    pub content: String,
    pub model: String,
    /// `None` when the vendor reported no finish reason at all.
    pub finish_reason: Option<FinishReason>,
    pub usage: Usage,
}

/// One streamed delta. The terminal chunk has `done = true` and an empty
/// delta; it fires exactly once, after every content delta.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub delta: String,
    pub done: bool,
}

/// Per-delta callback handed to [`LlmProvider::stream`].
pub type ChunkHandler<'a> = &'a mut (dyn FnMut(StreamChunk) + Send);

/// Contract for chat-completion backends.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// One-shot completion.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<ChatCompletionResponse, ProviderError>;

    /// Streaming completion. `on_chunk` fires once per content delta plus
    /// exactly once with `done = true`; the returned response is
    /// reconstructed from the accumulated stream.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
        on_chunk: ChunkHandler<'_>,
    ) -> Result<ChatCompletionResponse, ProviderError>;

    /// Lightweight reachability probe. Never errors — unreachable is `false`.
    async fn health_check(&self) -> bool;

    /// Provider name for logging ("openai", "anthropic", "gemini", "ollama").
    fn name(&self) -> &'static str;
}
