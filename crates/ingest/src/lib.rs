pub mod document;
pub mod embedding;

pub use document::chunker::{
    chunk_pages, chunk_text, ChunkMetadata, ChunkRecord, ChunkStrategy, ChunkingOptions,
};
pub use document::{extract_text, ExtractedDocument, ExtractionError, PageContent};
pub use embedding::{EmbeddingBatch, EmbeddingProvider, EmbeddingResult};
