//! Recursive separator-descent strategy.
//!
//! Tries paragraph breaks first, then lines, sentence ends, clause commas,
//! spaces, and finally raw characters — descending one level only for units
//! that still exceed the chunk size. Units are then merged back up to
//! `chunk_size`, each merged chunk seeded with an overlap tail from its
//! predecessor.

use crate::document::chunker::text::{
    clean_text_for_chunking, split_into_paragraphs, split_into_sentences,
};
use crate::document::chunker::types::{ChunkMetadata, ChunkRecord, ChunkingOptions};

use super::retain_min_size;

pub(crate) fn chunk_recursive(text: &str, options: &ChunkingOptions) -> Vec<ChunkRecord> {
    let cleaned = clean_text_for_chunking(text);
    if cleaned.is_empty() {
        return Vec::new();
    }

    let mut units = Vec::new();
    split_units(&cleaned, options.chunk_size, 0, &mut units);

    let merged = merge_units(&units, options);
    let chunks = merged
        .into_iter()
        .map(|content| ChunkRecord::new(content, ChunkMetadata::default()))
        .collect();
    retain_min_size(chunks, options.min_chunk_size)
}

/// Separator priority levels. Level 5 is the raw-character fallback.
const LEVEL_PARAGRAPH: usize = 0;
const LEVEL_LINE: usize = 1;
const LEVEL_SENTENCE: usize = 2;
const LEVEL_CLAUSE: usize = 3;
const LEVEL_WORD: usize = 4;

/// Break `text` into units no larger than `chunk_size`, descending to the
/// next separator level only when the current one leaves a unit oversized.
fn split_units(text: &str, chunk_size: usize, level: usize, out: &mut Vec<String>) {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return;
    }
    if trimmed.chars().count() <= chunk_size {
        out.push(trimmed.to_string());
        return;
    }

    let parts: Vec<String> = match level {
        LEVEL_PARAGRAPH => split_into_paragraphs(trimmed),
        LEVEL_LINE => trimmed.lines().map(|l| l.to_string()).collect(),
        LEVEL_SENTENCE => split_into_sentences(trimmed),
        LEVEL_CLAUSE => split_keeping_separator(trimmed, ", "),
        LEVEL_WORD => trimmed.split_whitespace().map(|w| w.to_string()).collect(),
        _ => {
            // Raw character windows — always succeeds.
            let chars: Vec<char> = trimmed.chars().collect();
            for window in chars.chunks(chunk_size) {
                out.push(window.iter().collect());
            }
            return;
        }
    };

    // A separator that failed to split anything falls straight through.
    if parts.len() <= 1 {
        split_units(trimmed, chunk_size, level + 1, out);
        return;
    }

    for part in parts {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if part.chars().count() <= chunk_size {
            out.push(part.to_string());
        } else {
            split_units(part, chunk_size, level + 1, out);
        }
    }
}

/// Split on `sep`, keeping the separator attached to the left piece.
fn split_keeping_separator(text: &str, sep: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find(sep) {
        let cut = pos + sep.len();
        parts.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }
    if !rest.is_empty() {
        parts.push(rest.to_string());
    }
    parts
}

/// Accumulate units into chunks up to `chunk_size`, seeding each chunk after
/// the first with an overlap tail from its predecessor.
fn merge_units(units: &[String], options: &ChunkingOptions) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for unit in units {
        let unit_len = unit.chars().count();
        let current_len = current.chars().count();

        if !current.is_empty() && current_len + 1 + unit_len > options.chunk_size {
            let previous = std::mem::take(&mut current);
            let seed = overlap_seed(&previous, options.chunk_overlap);
            chunks.push(previous);
            current = seed;
        }

        if current.is_empty() {
            current = unit.clone();
        } else {
            current.push(' ');
            current.push_str(unit);
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Tail of the previous chunk used to seed the next one.
///
/// Prefers the chunk's last complete sentence when it fits the overlap
/// window; otherwise falls back to a raw tail of `overlap` characters. The
/// raw fallback is authoritative when no sentence boundary exists in range.
fn overlap_seed(previous: &str, overlap: usize) -> String {
    if overlap == 0 {
        return String::new();
    }
    let total = previous.chars().count();
    if total <= overlap {
        return previous.to_string();
    }

    let sentences = split_into_sentences(previous);
    if let Some(last) = sentences.last() {
        let last_len = last.chars().count();
        if last_len > 0 && last_len <= overlap && last_len < total {
            return last.clone();
        }
    }

    previous
        .chars()
        .skip(total - overlap)
        .collect()
}
