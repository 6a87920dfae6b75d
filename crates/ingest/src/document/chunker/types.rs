//! Chunking configuration and output types.

use serde::{Deserialize, Serialize};

use super::text::estimate_tokens;

// ── Configuration ───────────────────────────────────────────────────────────

/// Which segmentation algorithm to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    Fixed,
    Recursive,
    Semantic,
    Page,
}

impl std::str::FromStr for ChunkStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(ChunkStrategy::Fixed),
            "recursive" => Ok(ChunkStrategy::Recursive),
            "semantic" => Ok(ChunkStrategy::Semantic),
            "page" => Ok(ChunkStrategy::Page),
            other => Err(format!("unknown chunk strategy: '{other}'")),
        }
    }
}

/// Configuration for a chunking run. Sizes are in characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingOptions {
    pub strategy: ChunkStrategy,
    /// Target chunk size (default: 1000).
    pub chunk_size: usize,
    /// Characters repeated between adjacent chunks (default: 200).
    pub chunk_overlap: usize,
    /// Chunks below this are dropped, except a document's final chunk (default: 100).
    pub min_chunk_size: usize,
    /// Hard ceiling when sentence-preserving break search extends a window (default: 2000).
    pub max_chunk_size: usize,
    /// Adjust window ends to sentence/paragraph boundaries (default: true).
    pub preserve_sentences: bool,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::Recursive,
            chunk_size: 1000,
            chunk_overlap: 200,
            min_chunk_size: 100,
            max_chunk_size: 2000,
            preserve_sentences: true,
        }
    }
}

impl ChunkingOptions {
    /// Normalize pathological configs. Overlap must stay strictly below
    /// chunk size or window arithmetic cannot advance.
    pub fn validated(mut self) -> Self {
        if self.chunk_size == 0 {
            self.chunk_size = 1;
        }
        if self.chunk_overlap >= self.chunk_size {
            self.chunk_overlap = self.chunk_size - 1;
        }
        if self.max_chunk_size < self.chunk_size {
            self.max_chunk_size = self.chunk_size;
        }
        self
    }
}

// ── Chunk output ────────────────────────────────────────────────────────────

/// Positional and source metadata attached to a chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_char: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_char: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// A bounded text segment, the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub content: String,
    /// Derived from `content` at construction.
    pub char_count: usize,
    /// `ceil(chars / 4)` estimate, not a real tokenizer count.
    pub token_count: usize,
    pub metadata: ChunkMetadata,
}

impl ChunkRecord {
    /// Build a record with derived counts. Counts are never set independently.
    pub fn new(content: String, metadata: ChunkMetadata) -> Self {
        let char_count = content.chars().count();
        let token_count = estimate_tokens(&content);
        Self {
            content,
            char_count,
            token_count,
            metadata,
        }
    }
}
