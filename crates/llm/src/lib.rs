pub mod provider;
pub mod providers;
mod sse;

pub use provider::{
    ChatCompletionResponse, ChatMessage, CompletionOptions, FinishReason, LlmProvider, Role,
    StreamChunk, Usage,
};
pub use providers::{create_llm_provider, LlmKind, ProviderRegistry};
