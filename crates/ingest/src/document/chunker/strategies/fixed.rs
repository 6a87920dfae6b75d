//! Fixed-size sliding-window strategy.

use crate::document::chunker::text::{
    clean_text_for_chunking, find_break_point_chars, DEFAULT_BREAK_SEARCH_RANGE,
};
use crate::document::chunker::types::{ChunkMetadata, ChunkRecord, ChunkingOptions};

/// Slide a `chunk_size` char window over cleaned text.
///
/// With `preserve_sentences`, each window end is nudged to the nearest
/// paragraph/sentence/word boundary (bounded by `max_chunk_size`). Undersized
/// non-final windows are skipped, not emitted; the final window is always
/// kept. `page_boundaries` maps a chunk's start offset to a page number:
/// ascending `(start_offset, page_number)` pairs over the cleaned text.
pub(crate) fn chunk_fixed(
    text: &str,
    options: &ChunkingOptions,
    page_boundaries: Option<&[(usize, usize)]>,
) -> Vec<ChunkRecord> {
    let cleaned = clean_text_for_chunking(text);
    let chars: Vec<char> = cleaned.chars().collect();
    let len = chars.len();
    if len == 0 {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < len {
        let mut end = (start + options.chunk_size).min(len);
        if options.preserve_sentences && end < len {
            let break_point = find_break_point_chars(&chars, end, DEFAULT_BREAK_SEARCH_RANGE);
            if break_point > start {
                end = break_point.min(start + options.max_chunk_size).min(len);
            }
        }

        let window: String = chars[start..end].iter().collect();
        let content = window.trim();
        let is_final = end >= len;

        if !content.is_empty() && (content.chars().count() >= options.min_chunk_size || is_final) {
            chunks.push(ChunkRecord::new(
                content.to_string(),
                ChunkMetadata {
                    start_char: Some(start),
                    end_char: Some(end),
                    page_number: page_boundaries.and_then(|table| page_for(table, start)),
                    ..ChunkMetadata::default()
                },
            ));
        }

        if is_final {
            break;
        }
        // Overlap must advance the cursor; a stalled window jumps to `end`.
        let mut next = end.saturating_sub(options.chunk_overlap);
        if next <= start {
            next = end;
        }
        start = next;
    }

    chunks
}

fn page_for(table: &[(usize, usize)], offset: usize) -> Option<usize> {
    table
        .iter()
        .take_while(|(start, _)| *start <= offset)
        .last()
        .map(|(_, page)| *page)
}
