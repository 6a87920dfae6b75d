use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub llm: LlmConfig,
    pub ollama: OllamaConfig,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub queue: QueueConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `RAGBASE_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = profiled_env_or("", "RAGBASE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            llm: LlmConfig::from_env_profiled(p),
            ollama: OllamaConfig::from_env_profiled(p),
            embedding: EmbeddingConfig::from_env_profiled(p),
            chunking: ChunkingConfig::from_env_profiled(p),
            queue: QueueConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  llm:       provider={}", self.llm.provider);
        tracing::info!("  ollama:    url={}", self.ollama.url);
        tracing::info!(
            "  embedding: provider={}, dimensions={}",
            self.embedding.provider,
            self.embedding.dimensions
        );
        tracing::info!(
            "  chunking:  strategy={}, chunk_size={}",
            self.chunking.strategy,
            self.chunking.chunk_size
        );
        tracing::info!("  queue:     max_attempts={}", self.queue.max_attempts);
    }
}

// ── LLM (OpenAI / Anthropic / Gemini / Ollama) ───────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "openai", "anthropic", "gemini", "ollama"
    pub provider: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub anthropic_base_url: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: u64,
}

impl LlmConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            provider: profiled_env_or(p, "LLM_PROVIDER", "ollama"),
            openai_api_key: profiled_env_opt(p, "OPENAI_API_KEY"),
            openai_model: profiled_env_or(p, "OPENAI_MODEL", "gpt-4o"),
            openai_base_url: profiled_env_opt(p, "OPENAI_BASE_URL"),
            anthropic_api_key: profiled_env_opt(p, "ANTHROPIC_API_KEY"),
            anthropic_model: profiled_env_or(p, "ANTHROPIC_MODEL", "claude-sonnet-4-5-20250929"),
            anthropic_base_url: profiled_env_opt(p, "ANTHROPIC_BASE_URL"),
            gemini_api_key: profiled_env_opt(p, "GEMINI_API_KEY"),
            gemini_model: profiled_env_or(p, "GEMINI_MODEL", "gemini-2.0-flash"),
            temperature: profiled_env_or(p, "LLM_TEMPERATURE", "0.1")
                .parse()
                .unwrap_or(0.1),
            max_tokens: profiled_env_u32(p, "LLM_MAX_TOKENS", 4096),
            max_retries: profiled_env_u32(p, "LLM_MAX_RETRIES", 3),
            retry_delay_ms: profiled_env_u64(p, "LLM_RETRY_DELAY_MS", 1000),
            timeout_ms: profiled_env_u64(p, "LLM_TIMEOUT_MS", 120_000),
        }
    }

    pub fn is_configured(&self) -> bool {
        match self.provider.as_str() {
            "openai" => self.openai_api_key.is_some(),
            "anthropic" => self.anthropic_api_key.is_some(),
            "gemini" => self.gemini_api_key.is_some(),
            "ollama" => true,
            _ => false,
        }
    }
}

// ── Ollama (local models) ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub url: String,
    pub model: String,
    pub embedding_model: String,
}

impl OllamaConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_or(p, "OLLAMA_URL", "http://localhost:11434"),
            model: profiled_env_or(p, "OLLAMA_MODEL", "llama3.2"),
            embedding_model: profiled_env_or(p, "OLLAMA_EMBEDDING_MODEL", "nomic-embed-text"),
        }
    }
}

// ── Embedding ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "ollama", "openai"
    pub provider: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: Option<String>,
    pub dimensions: usize,
    pub max_batch_size: usize,
    pub cache_capacity: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: u64,
}

impl EmbeddingConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            provider: profiled_env_or(p, "EMBEDDING_PROVIDER", "ollama"),
            openai_api_key: profiled_env_opt(p, "OPENAI_API_KEY"),
            openai_model: profiled_env_or(p, "OPENAI_EMBEDDING_MODEL", "text-embedding-3-small"),
            openai_base_url: profiled_env_opt(p, "OPENAI_BASE_URL"),
            dimensions: profiled_env_usize(p, "EMBEDDING_DIMENSIONS", 768),
            max_batch_size: profiled_env_usize(p, "EMBEDDING_MAX_BATCH_SIZE", 2048),
            cache_capacity: profiled_env_usize(p, "EMBEDDING_CACHE_CAPACITY", 10_000),
            max_retries: profiled_env_u32(p, "EMBEDDING_MAX_RETRIES", 3),
            retry_delay_ms: profiled_env_u64(p, "EMBEDDING_RETRY_DELAY_MS", 1000),
            timeout_ms: profiled_env_u64(p, "EMBEDDING_TIMEOUT_MS", 60_000),
        }
    }
}

// ── Chunking defaults ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// "fixed", "recursive", "semantic", "page"
    pub strategy: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
    pub preserve_sentences: bool,
}

impl ChunkingConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            strategy: profiled_env_or(p, "CHUNK_STRATEGY", "recursive"),
            chunk_size: profiled_env_usize(p, "CHUNK_SIZE", 1000),
            chunk_overlap: profiled_env_usize(p, "CHUNK_OVERLAP", 200),
            min_chunk_size: profiled_env_usize(p, "CHUNK_MIN_SIZE", 100),
            max_chunk_size: profiled_env_usize(p, "CHUNK_MAX_SIZE", 2000),
            preserve_sentences: profiled_env_or(p, "CHUNK_PRESERVE_SENTENCES", "true") == "true",
        }
    }
}

// ── Queue / pipeline ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub poll_interval_ms: u64,
    pub max_batch_size: u32,
    pub max_attempts: u32,
}

impl QueueConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            poll_interval_ms: profiled_env_u64(p, "QUEUE_POLL_INTERVAL_MS", 1000),
            max_batch_size: profiled_env_u32(p, "QUEUE_MAX_BATCH_SIZE", 10),
            max_attempts: profiled_env_u32(p, "QUEUE_MAX_ATTEMPTS", 3),
        }
    }
}
