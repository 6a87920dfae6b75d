//! Page-preserving strategy.

use crate::document::chunker::text::clean_text_for_chunking;
use crate::document::chunker::types::{ChunkMetadata, ChunkRecord, ChunkingOptions};
use crate::document::PageContent;

use super::{fixed, retain_min_size};

/// One chunk per page when the page fits `chunk_size`; otherwise the page is
/// handed to the fixed strategy and every resulting chunk is retagged with
/// the page number. Offsets are relative to the page's cleaned text.
pub(crate) fn chunk_by_page(pages: &[PageContent], options: &ChunkingOptions) -> Vec<ChunkRecord> {
    let mut chunks = Vec::new();

    for page in pages {
        let cleaned = clean_text_for_chunking(&page.text);
        let page_len = cleaned.chars().count();
        if page_len == 0 {
            continue;
        }

        if page_len <= options.chunk_size {
            chunks.push(ChunkRecord::new(
                cleaned,
                ChunkMetadata {
                    start_char: Some(0),
                    end_char: Some(page_len),
                    page_number: Some(page.page_number),
                    ..ChunkMetadata::default()
                },
            ));
        } else {
            for mut chunk in fixed::chunk_fixed(&cleaned, options, None) {
                chunk.metadata.page_number = Some(page.page_number);
                chunks.push(chunk);
            }
        }
    }

    retain_min_size(chunks, options.min_chunk_size)
}
