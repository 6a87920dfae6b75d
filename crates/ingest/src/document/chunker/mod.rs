//! Text chunking engine.
//!
//! Splits extracted documents into overlapping chunks suitable for embedding.
//! Four strategies with distinct break-point, overlap, and merge policies:
//! fixed (sliding char window), recursive (prioritized separator descent),
//! semantic (section/paragraph accumulation), and page (page-preserving).
//!
//! All strategies are deterministic pure functions: empty input yields an
//! empty chunk list, malformed text degrades instead of erroring.

mod strategies;
pub mod text;
mod types;

pub use strategies::{chunk_pages, chunk_text};
pub use types::{ChunkMetadata, ChunkRecord, ChunkStrategy, ChunkingOptions};

#[cfg(test)]
mod tests;
