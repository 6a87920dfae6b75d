pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ragbase_core::config::{LlmConfig, OllamaConfig};
use ragbase_core::ResilienceExecutor;

use crate::provider::LlmProvider;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// Closed set of chat backends; dispatch is exhaustively matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmKind {
    OpenAi,
    Anthropic,
    Gemini,
    Ollama,
}

impl std::str::FromStr for LlmKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(LlmKind::OpenAi),
            "anthropic" | "claude" => Ok(LlmKind::Anthropic),
            "gemini" | "google" => Ok(LlmKind::Gemini),
            "ollama" => Ok(LlmKind::Ollama),
            other => Err(format!("unknown LLM provider: '{other}'")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("provider not configured: {0}")]
    NotConfigured(String),
    #[error("unknown LLM provider: '{0}'")]
    UnknownProvider(String),
}

/// Build a provider from config. Strings exist only at this boundary; past
/// it, everything dispatches on [`LlmKind`].
pub fn create_llm_provider(
    llm: &LlmConfig,
    ollama: &OllamaConfig,
) -> Result<Arc<dyn LlmProvider>, FactoryError> {
    let kind: LlmKind = llm
        .provider
        .parse()
        .map_err(|_| FactoryError::UnknownProvider(llm.provider.clone()))?;

    let executor = |name| {
        ResilienceExecutor::for_llm(name, llm.max_retries, llm.retry_delay_ms, llm.timeout_ms)
    };

    match kind {
        LlmKind::OpenAi => {
            let api_key = llm
                .openai_api_key
                .clone()
                .ok_or_else(|| FactoryError::NotConfigured("OPENAI_API_KEY not set".into()))?;
            Ok(Arc::new(OpenAiProvider::new(
                api_key,
                llm.openai_model.clone(),
                llm.openai_base_url.clone(),
                executor("openai"),
            )))
        }
        LlmKind::Anthropic => {
            let api_key = llm
                .anthropic_api_key
                .clone()
                .ok_or_else(|| FactoryError::NotConfigured("ANTHROPIC_API_KEY not set".into()))?;
            Ok(Arc::new(AnthropicProvider::new(
                api_key,
                llm.anthropic_model.clone(),
                llm.anthropic_base_url.clone(),
                executor("anthropic"),
            )))
        }
        LlmKind::Gemini => {
            let api_key = llm
                .gemini_api_key
                .clone()
                .ok_or_else(|| FactoryError::NotConfigured("GEMINI_API_KEY not set".into()))?;
            Ok(Arc::new(GeminiProvider::new(
                api_key,
                llm.gemini_model.clone(),
                None,
                executor("gemini"),
            )))
        }
        LlmKind::Ollama => Ok(Arc::new(OllamaProvider::new(
            ollama.url.clone(),
            ollama.model.clone(),
            executor("ollama"),
        ))),
    }
}

/// Process-wide provider reuse: one instance per (kind, model).
pub struct ProviderRegistry {
    providers: Mutex<HashMap<(LlmKind, String), Arc<dyn LlmProvider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_create(
        &self,
        llm: &LlmConfig,
        ollama: &OllamaConfig,
    ) -> Result<Arc<dyn LlmProvider>, FactoryError> {
        let kind: LlmKind = llm
            .provider
            .parse()
            .map_err(|_| FactoryError::UnknownProvider(llm.provider.clone()))?;
        let model = match kind {
            LlmKind::OpenAi => llm.openai_model.clone(),
            LlmKind::Anthropic => llm.anthropic_model.clone(),
            LlmKind::Gemini => llm.gemini_model.clone(),
            LlmKind::Ollama => ollama.model.clone(),
        };

        let mut providers = self.providers.lock().unwrap();
        if let Some(provider) = providers.get(&(kind, model.clone())) {
            return Ok(provider.clone());
        }
        let provider = create_llm_provider(llm, ollama)?;
        providers.insert((kind, model), provider.clone());
        Ok(provider)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
