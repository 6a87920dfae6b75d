use super::{ExtractionError, PageContent};

/// Markdown passes through as text; headings are recognized downstream by
/// the semantic chunking strategy.
pub fn extract_md(bytes: &[u8]) -> Result<Vec<PageContent>, ExtractionError> {
    let text = String::from_utf8(bytes.to_vec())
        .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned());

    Ok(vec![PageContent {
        page_number: 1,
        text: text.trim().to_string(),
    }])
}
