//! Tests for the chunking engine.

use super::strategies::{chunk_pages, chunk_text};
use super::text::{
    clean_text_for_chunking, estimate_tokens, extract_sections, find_break_point,
    split_into_paragraphs, split_into_sentences,
};
use super::types::{ChunkRecord, ChunkStrategy, ChunkingOptions};
use crate::document::PageContent;

fn options(strategy: ChunkStrategy) -> ChunkingOptions {
    ChunkingOptions {
        strategy,
        chunk_size: 1000,
        chunk_overlap: 200,
        min_chunk_size: 100,
        max_chunk_size: 2000,
        preserve_sentences: false,
    }
}

fn make_pages(pages: Vec<(usize, &str)>) -> Vec<PageContent> {
    pages
        .into_iter()
        .map(|(page_number, text)| PageContent {
            page_number,
            text: text.to_string(),
        })
        .collect()
}

fn non_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn concatenated(chunks: &[ChunkRecord]) -> String {
    chunks.iter().map(|c| c.content.as_str()).collect()
}

// ── Text primitives ─────────────────────────────────────────────────

#[test]
fn token_estimate_is_ceil_of_quarter_chars() {
    assert_eq!(estimate_tokens(""), 0);
    assert_eq!(estimate_tokens("abcd"), 1);
    assert_eq!(estimate_tokens("abcde"), 2);
    assert_eq!(estimate_tokens(&"x".repeat(400)), 100);
}

#[test]
fn sentences_split_on_terminal_punctuation() {
    let sents = split_into_sentences("First sentence. Second sentence! Third one?");
    assert_eq!(
        sents,
        vec!["First sentence.", "Second sentence!", "Third one?"]
    );
}

#[test]
fn abbreviations_do_not_split_sentences() {
    let sents = split_into_sentences("Dr. Smith went home. He was tired.");
    assert_eq!(sents, vec!["Dr. Smith went home.", "He was tired."]);
}

#[test]
fn multiple_abbreviations_survive() {
    let sents = split_into_sentences("See e.g. the docs, i.e. chapter two. Then stop.");
    assert_eq!(sents.len(), 2);
    assert!(sents[0].contains("e.g."));
    assert!(sents[0].contains("i.e."));
}

#[test]
fn sentence_split_without_trailing_punctuation_keeps_tail() {
    let sents = split_into_sentences("Complete sentence. Trailing fragment without period");
    assert_eq!(sents.len(), 2);
    assert_eq!(sents[1], "Trailing fragment without period");
}

#[test]
fn paragraphs_split_on_blank_lines() {
    let paras = split_into_paragraphs("First para.\n\nSecond para.\n\n\nThird para.");
    assert_eq!(paras, vec!["First para.", "Second para.", "Third para."]);
}

#[test]
fn paragraphs_ignore_whitespace_only_lines() {
    let paras = split_into_paragraphs("Alpha\n   \nBeta");
    assert_eq!(paras, vec!["Alpha", "Beta"]);
}

#[test]
fn sections_detect_markdown_headers() {
    let sections = extract_sections("# Intro\nFirst body.\n\n## Methods\nSecond body.");
    assert_eq!(sections.len(), 2);
    assert_eq!(sections[0].header, "Intro");
    assert!(sections[0].content.contains("First body."));
    assert_eq!(sections[1].header, "Methods");
}

#[test]
fn sections_preamble_gets_empty_header() {
    let sections = extract_sections("Preamble text.\n\n# Title\nBody.");
    assert_eq!(sections.len(), 2);
    assert_eq!(sections[0].header, "");
    assert!(sections[0].content.contains("Preamble"));
    assert_eq!(sections[1].header, "Title");
}

#[test]
fn sections_detect_all_caps_lines() {
    let sections = extract_sections("EXECUTIVE SUMMARY OVERVIEW\nBody text here.");
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].header, "EXECUTIVE SUMMARY OVERVIEW");
}

#[test]
fn short_caps_line_is_not_a_header() {
    let sections = extract_sections("TWO WORDS\nBody text here.");
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].header, "");
}

#[test]
fn no_headers_yields_single_section() {
    let sections = extract_sections("Just some plain text.\n\nTwo paragraphs.");
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].header, "");
    assert!(sections[0].content.contains("plain text"));
}

#[test]
fn clean_text_normalizes_whitespace() {
    assert_eq!(clean_text_for_chunking("a\r\nb"), "a\nb");
    assert_eq!(clean_text_for_chunking("a  \t b"), "a b");
    assert_eq!(clean_text_for_chunking("a\n\n\n\nb"), "a\n\nb");
    assert_eq!(clean_text_for_chunking("   padded   "), "padded");
}

#[test]
fn break_point_prefers_paragraph_over_sentence() {
    let text = "Para one.\n\nPara two continues here.";
    // Paragraph break (after the blank line, index 11) beats the sentence
    // end (index 10) even when the sentence end is closer to target.
    assert_eq!(find_break_point(text, 9, 100), 11);
}

#[test]
fn break_point_falls_back_to_sentence_then_word() {
    let text = "Hello world. Next sentence here.";
    assert_eq!(find_break_point(text, 10, 100), 12);

    let no_sentences = "alpha beta gamma delta";
    let bp = find_break_point(no_sentences, 10, 100);
    // Lands just after a space.
    assert!(no_sentences.chars().nth(bp - 1).unwrap().is_whitespace());
}

#[test]
fn break_point_respects_search_range() {
    let text = "abcdefghij klmnopqrst";
    // The only space is at index 10, outside a range of 2 around target 5.
    assert_eq!(find_break_point(text, 5, 2), 5);
}

#[test]
fn break_point_past_end_clamps_to_len() {
    assert_eq!(find_break_point("short", 99, 100), 5);
}

// ── Options & record ────────────────────────────────────────────────

#[test]
fn validated_clamps_overlap_below_chunk_size() {
    let opts = ChunkingOptions {
        chunk_overlap: 1000,
        chunk_size: 1000,
        ..ChunkingOptions::default()
    }
    .validated();
    assert_eq!(opts.chunk_overlap, 999);
}

#[test]
fn chunk_record_derives_counts() {
    let record = ChunkRecord::new("abcdefgh".to_string(), Default::default());
    assert_eq!(record.char_count, 8);
    assert_eq!(record.token_count, 2);
}

// ── Fixed strategy ──────────────────────────────────────────────────

#[test]
fn fixed_window_scenario() {
    let text = "A".repeat(2500);
    let chunks = chunk_text(&text, &options(ChunkStrategy::Fixed));

    assert_eq!(chunks.len(), 3);
    for chunk in &chunks {
        assert!(chunk.char_count <= 1000);
    }
    assert_eq!(chunks[1].metadata.start_char, Some(800));
    // Final chunk (900 chars) retained even though windows overlap.
    assert_eq!(chunks[2].char_count, 900);
}

#[test]
fn fixed_final_chunk_kept_below_min_size() {
    let text = "B".repeat(1050);
    let mut opts = options(ChunkStrategy::Fixed);
    opts.chunk_overlap = 0;
    let chunks = chunk_text(&text, &opts);

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[1].char_count, 50);
    assert!(chunks[1].char_count < opts.min_chunk_size);
}

#[test]
fn fixed_empty_input_yields_no_chunks() {
    assert!(chunk_text("", &options(ChunkStrategy::Fixed)).is_empty());
    assert!(chunk_text("   \n\n  ", &options(ChunkStrategy::Fixed)).is_empty());
}

#[test]
fn fixed_coverage_with_zero_overlap() {
    let text = "word ".repeat(500);
    let mut opts = options(ChunkStrategy::Fixed);
    opts.chunk_overlap = 0;
    opts.min_chunk_size = 0;
    let chunks = chunk_text(&text, &opts);

    assert!(chunks.len() > 1);
    assert_eq!(
        non_whitespace(&concatenated(&chunks)),
        non_whitespace(&clean_text_for_chunking(&text))
    );
}

#[test]
fn fixed_preserve_sentences_breaks_near_boundaries() {
    let sentence = "This sentence has exactly digits in it plus padding words. ";
    let text = sentence.repeat(40);
    let mut opts = options(ChunkStrategy::Fixed);
    opts.preserve_sentences = true;
    opts.chunk_overlap = 0;
    let chunks = chunk_text(&text, &opts);

    assert!(chunks.len() > 1);
    for chunk in &chunks[..chunks.len() - 1] {
        assert!(chunk.char_count <= opts.max_chunk_size);
        // Every non-final chunk ends on a sentence boundary.
        assert!(
            chunk.content.ends_with('.'),
            "chunk should end at a sentence: {:?}",
            &chunk.content[chunk.content.len().saturating_sub(20)..]
        );
    }
}

#[test]
fn fixed_progress_on_pathological_overlap() {
    // Overlap equal to chunk size would stall; validated() clamps it and the
    // cursor still advances.
    let text = "C".repeat(500);
    let opts = ChunkingOptions {
        strategy: ChunkStrategy::Fixed,
        chunk_size: 100,
        chunk_overlap: 100,
        min_chunk_size: 0,
        max_chunk_size: 200,
        preserve_sentences: false,
    };
    let chunks = chunk_text(&text, &opts);
    assert!(!chunks.is_empty());
    let mut prev_start = None;
    for chunk in &chunks {
        let start = chunk.metadata.start_char.unwrap();
        if let Some(prev) = prev_start {
            assert!(start > prev, "chunk starts must strictly increase");
        }
        prev_start = Some(start);
    }
}

#[test]
fn fixed_idempotent() {
    let text = "The quick brown fox. ".repeat(120);
    let opts = options(ChunkStrategy::Fixed);
    assert_eq!(chunk_text(&text, &opts), chunk_text(&text, &opts));
}

// ── Recursive strategy ──────────────────────────────────────────────

#[test]
fn recursive_splits_paragraphs_first() {
    let text = "Alpha one.\n\nBeta two.\n\nGamma three.";
    let opts = ChunkingOptions {
        strategy: ChunkStrategy::Recursive,
        chunk_size: 15,
        chunk_overlap: 0,
        min_chunk_size: 0,
        max_chunk_size: 30,
        preserve_sentences: false,
    };
    let chunks = chunk_text(text, &opts);
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].content, "Alpha one.");
    assert_eq!(chunks[2].content, "Gamma three.");
}

#[test]
fn recursive_merges_small_pieces() {
    let text = "Tiny.\n\nAlso tiny.\n\nStill small.";
    let opts = ChunkingOptions {
        strategy: ChunkStrategy::Recursive,
        chunk_size: 100,
        chunk_overlap: 0,
        min_chunk_size: 0,
        max_chunk_size: 200,
        preserve_sentences: false,
    };
    let chunks = chunk_text(text, &opts);
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].content.contains("Tiny."));
    assert!(chunks[0].content.contains("Still small."));
}

#[test]
fn recursive_falls_through_to_char_level() {
    // No paragraph, sentence, comma, or space boundaries at all.
    let text = "x".repeat(2500);
    let opts = ChunkingOptions {
        strategy: ChunkStrategy::Recursive,
        chunk_size: 1000,
        chunk_overlap: 0,
        min_chunk_size: 0,
        max_chunk_size: 2000,
        preserve_sentences: false,
    };
    let chunks = chunk_text(&text, &opts);
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].char_count, 1000);
    assert_eq!(chunks[2].char_count, 500);
}

#[test]
fn recursive_overlap_seed_prefers_last_sentence() {
    let text = "First part stays here. Tail sentence.\n\nSecond paragraph follows with more words here.";
    let opts = ChunkingOptions {
        strategy: ChunkStrategy::Recursive,
        chunk_size: 60,
        chunk_overlap: 30,
        min_chunk_size: 0,
        max_chunk_size: 120,
        preserve_sentences: false,
    };
    let chunks = chunk_text(text, &opts);
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].content, "First part stays here. Tail sentence.");
    assert!(
        chunks[1].content.starts_with("Tail sentence."),
        "overlap seed should be the previous chunk's last sentence: {:?}",
        chunks[1].content
    );
}

#[test]
fn recursive_raw_overlap_when_no_sentence_fits() {
    let text = format!("{}\n\n{}", "a".repeat(60), "b".repeat(60));
    let opts = ChunkingOptions {
        strategy: ChunkStrategy::Recursive,
        chunk_size: 60,
        chunk_overlap: 10,
        min_chunk_size: 0,
        max_chunk_size: 120,
        preserve_sentences: false,
    };
    let chunks = chunk_text(&text, &opts);
    assert_eq!(chunks.len(), 2);
    // No sentence boundary inside the first chunk: raw 10-char tail.
    assert!(chunks[1].content.starts_with(&"a".repeat(10)));
    assert!(chunks[1].content.ends_with(&"b".repeat(60)));
}

#[test]
fn recursive_drops_undersized_merged_chunks_except_final() {
    let text = "Large paragraph with plenty of words to stand on its own for the minimum.\n\nok";
    let opts = ChunkingOptions {
        strategy: ChunkStrategy::Recursive,
        chunk_size: 75,
        chunk_overlap: 0,
        min_chunk_size: 10,
        max_chunk_size: 150,
        preserve_sentences: false,
    };
    let chunks = chunk_text(text, &opts);
    // The trailing "ok" is below min size but is the final chunk: retained.
    assert_eq!(chunks.last().unwrap().content, "ok");
}

#[test]
fn recursive_coverage_with_zero_overlap() {
    let text = "Sentence number one here.\n\nSentence number two here.\n\nSentence number three here.";
    let opts = ChunkingOptions {
        strategy: ChunkStrategy::Recursive,
        chunk_size: 30,
        chunk_overlap: 0,
        min_chunk_size: 0,
        max_chunk_size: 60,
        preserve_sentences: false,
    };
    let chunks = chunk_text(text, &opts);
    assert_eq!(
        non_whitespace(&concatenated(&chunks)),
        non_whitespace(&clean_text_for_chunking(text))
    );
}

#[test]
fn recursive_empty_input_yields_no_chunks() {
    assert!(chunk_text("", &options(ChunkStrategy::Recursive)).is_empty());
}

#[test]
fn recursive_idempotent() {
    let text = "Some sentences here. More text follows, with clauses, and words.\n\nAnother paragraph.";
    let opts = options(ChunkStrategy::Recursive);
    assert_eq!(chunk_text(text, &opts), chunk_text(text, &opts));
}

// ── Semantic strategy ───────────────────────────────────────────────

#[test]
fn semantic_tags_chunks_with_section_header() {
    let text = "# Introduction\nIntro paragraph content.\n\n# Methods\nMethods paragraph content.";
    let opts = ChunkingOptions {
        strategy: ChunkStrategy::Semantic,
        chunk_size: 500,
        chunk_overlap: 0,
        min_chunk_size: 0,
        max_chunk_size: 1000,
        preserve_sentences: false,
    };
    let chunks = chunk_text(text, &opts);
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].metadata.section.as_deref(), Some("Introduction"));
    assert_eq!(chunks[1].metadata.section.as_deref(), Some("Methods"));
}

#[test]
fn semantic_accumulates_paragraphs_within_budget() {
    let text = "Para one is short.\n\nPara two is short.\n\nPara three is short.";
    let opts = ChunkingOptions {
        strategy: ChunkStrategy::Semantic,
        chunk_size: 500,
        chunk_overlap: 0,
        min_chunk_size: 0,
        max_chunk_size: 1000,
        preserve_sentences: false,
    };
    let chunks = chunk_text(text, &opts);
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].content.contains("Para one"));
    assert!(chunks[0].content.contains("Para three"));
}

#[test]
fn semantic_flushes_when_budget_would_overflow() {
    let p1 = "alpha ".repeat(10);
    let p2 = "beta ".repeat(10);
    let text = format!("{}\n\n{}", p1.trim(), p2.trim());
    let opts = ChunkingOptions {
        strategy: ChunkStrategy::Semantic,
        chunk_size: 70,
        chunk_overlap: 0,
        min_chunk_size: 0,
        max_chunk_size: 140,
        preserve_sentences: false,
    };
    let chunks = chunk_text(&text, &opts);
    assert_eq!(chunks.len(), 2);
    assert!(chunks[0].content.contains("alpha"));
    assert!(!chunks[0].content.contains("beta"));
}

#[test]
fn semantic_reseeds_with_previous_paragraph_when_overlapping() {
    let p1 = "First paragraph body.";
    let p2 = "Second paragraph body.";
    let p3 = "Third paragraph body.";
    let text = format!("{p1}\n\n{p2}\n\n{p3}");
    let opts = ChunkingOptions {
        strategy: ChunkStrategy::Semantic,
        chunk_size: 50,
        chunk_overlap: 20,
        min_chunk_size: 0,
        max_chunk_size: 100,
        preserve_sentences: false,
    };
    let chunks = chunk_text(&text, &opts);
    assert!(chunks.len() >= 2);
    // The second chunk re-opens with the paragraph that closed the first.
    assert!(chunks[1].content.starts_with(p2));
}

#[test]
fn semantic_splits_oversized_paragraph_by_sentences() {
    let para = "One short sentence here. ".repeat(20);
    let opts = ChunkingOptions {
        strategy: ChunkStrategy::Semantic,
        chunk_size: 100,
        chunk_overlap: 0,
        min_chunk_size: 0,
        max_chunk_size: 200,
        preserve_sentences: false,
    };
    let chunks = chunk_text(&para, &opts);
    assert!(chunks.len() > 1);
    for chunk in &chunks {
        assert!(chunk.char_count <= 100);
    }
}

#[test]
fn semantic_oversized_sentence_degrades_to_char_windows() {
    let text = "z".repeat(350);
    let opts = ChunkingOptions {
        strategy: ChunkStrategy::Semantic,
        chunk_size: 100,
        chunk_overlap: 0,
        min_chunk_size: 0,
        max_chunk_size: 200,
        preserve_sentences: false,
    };
    let chunks = chunk_text(&text, &opts);
    assert_eq!(chunks.len(), 4);
    assert_eq!(chunks[3].char_count, 50);
}

#[test]
fn semantic_coverage_with_zero_overlap() {
    let text = "First paragraph here.\n\nSecond paragraph here.\n\nThird paragraph wraps it up.";
    let opts = ChunkingOptions {
        strategy: ChunkStrategy::Semantic,
        chunk_size: 30,
        chunk_overlap: 0,
        min_chunk_size: 0,
        max_chunk_size: 60,
        preserve_sentences: false,
    };
    let chunks = chunk_text(text, &opts);
    assert_eq!(
        non_whitespace(&concatenated(&chunks)),
        non_whitespace(&clean_text_for_chunking(text))
    );
}

#[test]
fn semantic_empty_input_yields_no_chunks() {
    assert!(chunk_text("", &options(ChunkStrategy::Semantic)).is_empty());
}

// ── Page strategy ───────────────────────────────────────────────────

#[test]
fn page_emits_one_chunk_per_fitting_page() {
    let pages = make_pages(vec![
        (1, "Page one content."),
        (2, "Page two content."),
        (3, "Page three content."),
    ]);
    let opts = ChunkingOptions {
        strategy: ChunkStrategy::Page,
        chunk_size: 500,
        chunk_overlap: 0,
        min_chunk_size: 0,
        max_chunk_size: 1000,
        preserve_sentences: false,
    };
    let chunks = chunk_pages(&pages, &opts);
    assert_eq!(chunks.len(), 3);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.metadata.page_number, Some(i + 1));
    }
}

#[test]
fn page_delegates_oversized_pages_to_fixed() {
    let text = "D".repeat(2500);
    let pages = make_pages(vec![(7, text.as_str())]);
    let opts = ChunkingOptions {
        strategy: ChunkStrategy::Page,
        chunk_size: 1000,
        chunk_overlap: 200,
        min_chunk_size: 100,
        max_chunk_size: 2000,
        preserve_sentences: false,
    };
    let chunks = chunk_pages(&pages, &opts);
    assert_eq!(chunks.len(), 3);
    for chunk in &chunks {
        assert_eq!(chunk.metadata.page_number, Some(7));
    }
}

#[test]
fn page_skips_empty_pages() {
    let pages = make_pages(vec![(1, "Content."), (2, "   "), (3, "More.")]);
    let opts = ChunkingOptions {
        strategy: ChunkStrategy::Page,
        chunk_size: 500,
        chunk_overlap: 0,
        min_chunk_size: 0,
        max_chunk_size: 1000,
        preserve_sentences: false,
    };
    let chunks = chunk_pages(&pages, &opts);
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].metadata.page_number, Some(1));
    assert_eq!(chunks[1].metadata.page_number, Some(3));
}

#[test]
fn fixed_over_pages_tags_page_numbers_by_offset() {
    let pages = make_pages(vec![
        (1, "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"), // 30 chars
        (2, "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"), // 30 chars
    ]);
    let opts = ChunkingOptions {
        strategy: ChunkStrategy::Fixed,
        chunk_size: 40,
        chunk_overlap: 0,
        min_chunk_size: 0,
        max_chunk_size: 80,
        preserve_sentences: false,
    };
    let chunks = chunk_pages(&pages, &opts);
    assert_eq!(chunks.len(), 2);
    // First window starts on page 1, second starts inside page 2.
    assert_eq!(chunks[0].metadata.page_number, Some(1));
    assert_eq!(chunks[1].metadata.page_number, Some(2));
}

#[test]
fn page_strategy_on_bare_text_is_single_page() {
    let chunks = chunk_text(
        "Short document.",
        &ChunkingOptions {
            strategy: ChunkStrategy::Page,
            chunk_size: 500,
            chunk_overlap: 0,
            min_chunk_size: 0,
            max_chunk_size: 1000,
            preserve_sentences: false,
        },
    );
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].metadata.page_number, Some(1));
}

#[test]
fn page_empty_input_yields_no_chunks() {
    let chunks = chunk_pages(&[], &options(ChunkStrategy::Page));
    assert!(chunks.is_empty());
}
