//! Stateless text-analysis primitives shared by all chunking strategies.
//!
//! Everything here operates on character indices, not byte offsets, so
//! multi-byte input never lands a cut inside a code point.

/// Search radius for [`find_break_point`].
pub const DEFAULT_BREAK_SEARCH_RANGE: usize = 100;

/// Abbreviations that must not terminate a sentence.
const ABBREVIATIONS: &[&str] = &[
    "Mr.", "Mrs.", "Ms.", "Dr.", "Prof.", "Sr.", "Jr.", "St.", "vs.", "e.g.", "i.e.", "etc.",
];

/// Placeholder substituted for abbreviation periods while splitting.
const SENTINEL: char = '\u{1}';

/// Rough token estimate: `ceil(chars / 4)`.
///
/// This is a character-count approximation, not a tokenizer result. Callers
/// doing budget math must treat it as an estimate only.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Split on sentence-final punctuation (`.` `!` `?`) followed by whitespace.
///
/// Known abbreviations ("Dr.", "e.g.", ...) are masked with a sentinel before
/// the scan and restored afterwards, so they never produce a false split.
pub fn split_into_sentences(text: &str) -> Vec<String> {
    let mut masked = text.to_string();
    for abbr in ABBREVIATIONS {
        if masked.contains(abbr) {
            let protected: String = abbr
                .chars()
                .map(|c| if c == '.' { SENTINEL } else { c })
                .collect();
            masked = masked.replace(abbr, &protected);
        }
    }

    let chars: Vec<char> = masked.chars().collect();
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        if matches!(chars[i], '.' | '!' | '?')
            && (i + 1 >= chars.len() || chars[i + 1].is_whitespace())
        {
            let raw: String = chars[start..=i].iter().collect();
            push_restored(&mut sentences, &raw);
            i += 1;
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            start = i;
            continue;
        }
        i += 1;
    }

    if start < chars.len() {
        let tail: String = chars[start..].iter().collect();
        push_restored(&mut sentences, &tail);
    }
    sentences
}

fn push_restored(sentences: &mut Vec<String>, raw: &str) {
    let restored = raw.replace(SENTINEL, ".");
    let trimmed = restored.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
}

/// Split on blank lines; pieces are trimmed and empties dropped.
pub fn split_into_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.trim().is_empty() {
                paragraphs.push(current.trim().to_string());
            }
            current.clear();
        } else {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
        }
    }
    if !current.trim().is_empty() {
        paragraphs.push(current.trim().to_string());
    }
    paragraphs
}

/// A header-delimited span of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Empty for preamble text before the first header.
    pub header: String,
    pub content: String,
}

/// Split a document at markdown headers (`#`–`######`) or all-caps lines.
///
/// Text before any header lands in an empty-header section. A document with
/// no headers at all comes back as one section with an empty header.
pub fn extract_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut header = String::new();
    let mut content = String::new();
    let mut found_header = false;

    for line in text.lines() {
        if let Some(found) = header_text(line) {
            found_header = true;
            flush_section(&mut sections, &header, &content);
            header = found;
            content.clear();
        } else {
            content.push_str(line);
            content.push('\n');
        }
    }
    flush_section(&mut sections, &header, &content);

    if !found_header {
        return vec![Section {
            header: String::new(),
            content: text.trim().to_string(),
        }];
    }
    sections
}

fn flush_section(sections: &mut Vec<Section>, header: &str, content: &str) {
    let content = content.trim();
    if header.is_empty() && content.is_empty() {
        return;
    }
    sections.push(Section {
        header: header.to_string(),
        content: content.to_string(),
    });
}

fn header_text(line: &str) -> Option<String> {
    let trimmed = line.trim();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if (1..=6).contains(&hashes) {
        let rest = trimmed[hashes..].trim();
        if !rest.is_empty() {
            return Some(rest.to_string());
        }
    }
    if is_all_caps_line(trimmed) {
        return Some(trimmed.to_string());
    }
    None
}

/// At least three words, every letter uppercase, every word containing one.
fn is_all_caps_line(line: &str) -> bool {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.len() < 3 {
        return false;
    }
    words.iter().all(|w| {
        w.chars().any(|c| c.is_alphabetic())
            && w.chars().all(|c| !c.is_alphabetic() || c.is_uppercase())
    })
}

/// Normalize text before windowed chunking: CRLF to LF, runs of horizontal
/// whitespace to one space, 3+ newlines to 2, trimmed.
pub fn clean_text_for_chunking(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(unified.len());
    let mut prev_space = false;
    let mut newline_run = 0u32;

    for c in unified.chars() {
        if c == '\n' {
            newline_run += 1;
            prev_space = false;
            if newline_run <= 2 {
                out.push('\n');
            }
        } else if c == ' ' || c == '\t' {
            newline_run = 0;
            if !prev_space {
                out.push(' ');
            }
            prev_space = true;
        } else {
            newline_run = 0;
            prev_space = false;
            out.push(c);
        }
    }
    out.trim().to_string()
}

/// Find the best cut position near `target` (a char index).
///
/// Within `[target - search_range, target + search_range]`, prefer a
/// paragraph break, then a sentence end, then a word boundary; fall back to
/// `target` itself. Each tier picks the candidate closest to `target`.
pub fn find_break_point(text: &str, target: usize, search_range: usize) -> usize {
    let chars: Vec<char> = text.chars().collect();
    find_break_point_chars(&chars, target, search_range)
}

pub(crate) fn find_break_point_chars(chars: &[char], target: usize, search_range: usize) -> usize {
    let len = chars.len();
    if target >= len {
        return len;
    }
    let lo = target.saturating_sub(search_range);
    let hi = (target + search_range).min(len);

    let mut paragraph: Option<usize> = None;
    let mut sentence: Option<usize> = None;
    let mut word: Option<usize> = None;

    for i in lo..hi {
        // Cut lands after the separator so the next window starts on content.
        if chars[i] == '\n' && i + 1 < len && chars[i + 1] == '\n' {
            keep_closest(&mut paragraph, i + 2, target);
        }
        if matches!(chars[i], '.' | '!' | '?')
            && (i + 1 >= len || chars[i + 1].is_whitespace())
        {
            keep_closest(&mut sentence, i + 1, target);
        }
        if chars[i].is_whitespace() {
            keep_closest(&mut word, i + 1, target);
        }
    }

    paragraph.or(sentence).or(word).unwrap_or(target)
}

fn keep_closest(slot: &mut Option<usize>, candidate: usize, target: usize) {
    let better = match *slot {
        Some(current) => candidate.abs_diff(target) < current.abs_diff(target),
        None => true,
    };
    if better {
        *slot = Some(candidate);
    }
}
