//! Compose retrieved chunks into LLM prompts.

use ragbase_llm::ChatMessage;

use crate::store::ScoredPoint;

/// Placeholder in the system prompt replaced with the context blocks.
const CONTEXT_PLACEHOLDER: &str = "<<<context>>>";

const RAG_SYSTEM_PROMPT: &str = "You are a knowledgeable assistant. Answer the user's question using \
the context passages below. If the context does not contain the answer, say so instead of guessing. \
Cite the passage number when it supports your answer.\n\nContext:\n<<<context>>>";

const EMPTY_CONTEXT_NOTE: &str = "(no relevant passages were found)";

/// Render retrieved points as numbered context blocks.
///
/// Each block carries the chunk content plus whatever source attribution the
/// payload has (filename, page, section header).
pub fn build_context(points: &[ScoredPoint]) -> String {
    if points.is_empty() {
        return EMPTY_CONTEXT_NOTE.to_string();
    }

    points
        .iter()
        .enumerate()
        .map(|(i, point)| {
            let content = point.payload["content"].as_str().unwrap_or_default();
            let mut attribution = Vec::new();
            if let Some(source) = point.payload["source"].as_str() {
                attribution.push(source.to_string());
            }
            if let Some(page) = point.payload["page_number"].as_u64() {
                attribution.push(format!("page {page}"));
            }
            if let Some(header) = point.payload["header"].as_str() {
                attribution.push(format!("\"{header}\""));
            }
            if attribution.is_empty() {
                format!("[{}] {}", i + 1, content)
            } else {
                format!("[{}] ({}) {}", i + 1, attribution.join(", "), content)
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the full message list: system prompt with context, prior turns,
/// then the user's question.
pub fn compose_messages(
    question: &str,
    history: &[ChatMessage],
    points: &[ScoredPoint],
) -> Vec<ChatMessage> {
    let system = RAG_SYSTEM_PROMPT.replace(CONTEXT_PLACEHOLDER, &build_context(points));

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system));
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(question));
    messages
}
