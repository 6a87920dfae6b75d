//! Sub-batch splitting for providers with a native batch-size ceiling.

use std::future::Future;

use ragbase_core::ProviderError;

use super::traits::{EmbeddingBatch, EmbeddingUsage};

/// Partition `texts` into sequential sub-batches of at most `max_batch_size`,
/// invoke `call` per sub-batch, and merge the results: embeddings are
/// concatenated with contiguous indices `0..N-1` in input order, usage
/// counters are summed.
pub async fn embed_in_sub_batches<F, Fut>(
    texts: &[String],
    max_batch_size: usize,
    mut call: F,
) -> Result<EmbeddingBatch, ProviderError>
where
    F: FnMut(Vec<String>) -> Fut,
    Fut: Future<Output = Result<EmbeddingBatch, ProviderError>>,
{
    let size = max_batch_size.max(1);
    let mut merged: Option<EmbeddingBatch> = None;

    for sub in texts.chunks(size) {
        let mut batch = call(sub.to_vec()).await?;
        batch.embeddings.sort_by_key(|e| e.index);

        match merged.as_mut() {
            None => merged = Some(batch),
            Some(acc) => {
                acc.embeddings.extend(batch.embeddings);
                acc.usage = match (acc.usage, batch.usage) {
                    (Some(a), Some(b)) => Some(EmbeddingUsage {
                        prompt_tokens: a.prompt_tokens + b.prompt_tokens,
                        total_tokens: a.total_tokens + b.total_tokens,
                    }),
                    (a, b) => a.or(b),
                };
            }
        }
    }

    let mut result = merged.unwrap_or_else(|| EmbeddingBatch::empty("", 0));
    for (i, embedding) in result.embeddings.iter_mut().enumerate() {
        embedding.index = i;
    }
    Ok(result)
}
