//! Section-aware semantic strategy.
//!
//! Chunks follow the document's own structure: sections from headers,
//! paragraphs accumulated until the chunk budget would overflow, oversized
//! paragraphs split into sentence groups. Each chunk carries its section
//! header.

use crate::document::chunker::text::{
    clean_text_for_chunking, extract_sections, split_into_paragraphs, split_into_sentences,
};
use crate::document::chunker::types::{ChunkMetadata, ChunkRecord, ChunkingOptions};

use super::retain_min_size;

pub(crate) fn chunk_semantic(text: &str, options: &ChunkingOptions) -> Vec<ChunkRecord> {
    let cleaned = clean_text_for_chunking(text);
    if cleaned.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();

    for section in extract_sections(&cleaned) {
        let header = if section.header.is_empty() {
            None
        } else {
            Some(section.header.clone())
        };

        let mut current = String::new();
        let mut last_paragraph = String::new();

        for paragraph in split_into_paragraphs(&section.content) {
            let paragraph_len = paragraph.chars().count();

            if paragraph_len > options.chunk_size {
                // Flush, then break the paragraph down by sentence groups.
                flush(&mut chunks, &mut current, &header);
                for group in sentence_groups(&paragraph, options.chunk_size) {
                    push_chunk(&mut chunks, group, &header);
                }
                last_paragraph.clear();
                continue;
            }

            let current_len = current.chars().count();
            if current_len > 0 && current_len + 2 + paragraph_len > options.chunk_size {
                flush(&mut chunks, &mut current, &header);
                // Reseed with the flushed chunk's last paragraph for overlap.
                if options.chunk_overlap > 0
                    && !last_paragraph.is_empty()
                    && last_paragraph.chars().count() + 2 + paragraph_len <= options.chunk_size
                {
                    current = last_paragraph.clone();
                }
            }

            if current.is_empty() {
                current = paragraph.clone();
            } else {
                current.push_str("\n\n");
                current.push_str(&paragraph);
            }
            last_paragraph = paragraph;
        }
        flush(&mut chunks, &mut current, &header);
    }

    retain_min_size(chunks, options.min_chunk_size)
}

fn flush(chunks: &mut Vec<ChunkRecord>, current: &mut String, header: &Option<String>) {
    let content = std::mem::take(current);
    let content = content.trim();
    if !content.is_empty() {
        push_chunk(chunks, content.to_string(), header);
    }
}

fn push_chunk(chunks: &mut Vec<ChunkRecord>, content: String, header: &Option<String>) {
    chunks.push(ChunkRecord::new(
        content,
        ChunkMetadata {
            section: header.clone(),
            ..ChunkMetadata::default()
        },
    ));
}

/// Group a paragraph's sentences into pieces no larger than `chunk_size`.
/// A single sentence over the budget degrades to raw char windows.
fn sentence_groups(paragraph: &str, chunk_size: usize) -> Vec<String> {
    let mut groups = Vec::new();
    let mut current = String::new();

    for sentence in split_into_sentences(paragraph) {
        let sentence_len = sentence.chars().count();

        if sentence_len > chunk_size {
            if !current.is_empty() {
                groups.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = sentence.chars().collect();
            for window in chars.chunks(chunk_size) {
                groups.push(window.iter().collect());
            }
            continue;
        }

        let current_len = current.chars().count();
        if current_len > 0 && current_len + 1 + sentence_len > chunk_size {
            groups.push(std::mem::take(&mut current));
        }
        if current.is_empty() {
            current = sentence;
        } else {
            current.push(' ');
            current.push_str(&sentence);
        }
    }

    if !current.is_empty() {
        groups.push(current);
    }
    groups
}
