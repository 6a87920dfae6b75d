//! Strategy dispatch and the shared min-size retention policy.

mod fixed;
mod page;
mod recursive;
mod semantic;

use crate::document::PageContent;

use super::types::{ChunkRecord, ChunkStrategy, ChunkingOptions};

/// Chunk a plain string with the configured strategy.
///
/// The `Page` strategy treats the whole string as page 1.
pub fn chunk_text(text: &str, options: &ChunkingOptions) -> Vec<ChunkRecord> {
    let options = options.clone().validated();
    match options.strategy {
        ChunkStrategy::Fixed => fixed::chunk_fixed(text, &options, None),
        ChunkStrategy::Recursive => recursive::chunk_recursive(text, &options),
        ChunkStrategy::Semantic => semantic::chunk_semantic(text, &options),
        ChunkStrategy::Page => {
            let single = [PageContent {
                page_number: 1,
                text: text.to_string(),
            }];
            page::chunk_by_page(&single, &options)
        }
    }
}

/// Chunk paged input (typically a PDF) with the configured strategy.
///
/// `Page` keeps page boundaries; `Fixed` chunks the joined text but tags each
/// chunk with the page its start offset falls on; the merge-based strategies
/// run over the joined text.
pub fn chunk_pages(pages: &[PageContent], options: &ChunkingOptions) -> Vec<ChunkRecord> {
    let options = options.clone().validated();
    match options.strategy {
        ChunkStrategy::Page => page::chunk_by_page(pages, &options),
        ChunkStrategy::Fixed => {
            let (joined, boundaries) = join_pages(pages);
            fixed::chunk_fixed(&joined, &options, Some(&boundaries))
        }
        ChunkStrategy::Recursive | ChunkStrategy::Semantic => {
            let joined = pages
                .iter()
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            match options.strategy {
                ChunkStrategy::Recursive => recursive::chunk_recursive(&joined, &options),
                _ => semantic::chunk_semantic(&joined, &options),
            }
        }
    }
}

/// Join cleaned page texts with a paragraph gap and record each page's start
/// offset (char index into the joined text).
fn join_pages(pages: &[PageContent]) -> (String, Vec<(usize, usize)>) {
    let mut joined = String::new();
    let mut boundaries = Vec::with_capacity(pages.len());
    let mut offset = 0usize;

    for page in pages {
        let cleaned = super::text::clean_text_for_chunking(&page.text);
        if cleaned.is_empty() {
            continue;
        }
        if !joined.is_empty() {
            joined.push_str("\n\n");
            offset += 2;
        }
        boundaries.push((offset, page.page_number));
        offset += cleaned.chars().count();
        joined.push_str(&cleaned);
    }
    (joined, boundaries)
}

/// Drop chunks below `min_chunk_size`, always keeping the final chunk so a
/// trailing remainder is never silently lost.
pub(crate) fn retain_min_size(chunks: Vec<ChunkRecord>, min_chunk_size: usize) -> Vec<ChunkRecord> {
    let last = chunks.len().saturating_sub(1);
    chunks
        .into_iter()
        .enumerate()
        .filter(|(i, c)| c.char_count >= min_chunk_size || *i == last)
        .map(|(_, c)| c)
        .collect()
}
