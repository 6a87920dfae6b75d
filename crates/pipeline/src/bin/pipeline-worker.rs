//! pipeline-worker — queue-driven document processing worker.
//!
//! The composition root: loads config, wires the chunker, embedding provider,
//! cache, and vector store into a [`PipelineWorker`], and polls for jobs.
//!
//! With `--file`, seeds the in-memory queue with one job per stage for the
//! given document and exits once the queue drains — an end-to-end local run
//! without any external queue or database.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use ragbase_core::config::load_dotenv;
use ragbase_core::Config;
use ragbase_ingest::embedding::{create_embedding_provider, InMemoryEmbeddingCache};
use ragbase_ingest::{ChunkStrategy, ChunkingOptions};
use ragbase_pipeline::{
    DocumentStatus, InMemoryDocumentStore, InMemoryQueue, JobPayload, JobStage, PipelineWorker,
};
use ragbase_rag::{EmbeddingService, InMemoryVectorStore};

// ── CLI ─────────────────────────────────────────────────────────────

/// Document ingestion worker: upload → parse → chunk → embed.
#[derive(Parser, Debug)]
#[command(name = "pipeline-worker", version, about)]
struct Cli {
    /// Process a single local file end-to-end, then exit.
    #[arg(long)]
    file: Option<std::path::PathBuf>,

    /// Agent whose collection receives the vectors.
    #[arg(long, default_value = "local")]
    agent_id: String,

    /// Knowledge-base identifier for the document.
    #[arg(long, default_value = "local")]
    knowledge_base_id: String,
}

fn chunking_from_config(config: &Config) -> ChunkingOptions {
    ChunkingOptions {
        strategy: config
            .chunking
            .strategy
            .parse()
            .unwrap_or(ChunkStrategy::Recursive),
        chunk_size: config.chunking.chunk_size,
        chunk_overlap: config.chunking.chunk_overlap,
        min_chunk_size: config.chunking.min_chunk_size,
        max_chunk_size: config.chunking.max_chunk_size,
        preserve_sentences: config.chunking.preserve_sentences,
    }
    .validated()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let config = Config::from_env();
    config.log_summary();

    let cli = Cli::parse();

    let provider = create_embedding_provider(&config.embedding, &config.ollama)?;
    let cache = Arc::new(InMemoryEmbeddingCache::new(config.embedding.cache_capacity));
    let embedding = Arc::new(EmbeddingService::new(provider, Some(cache)));

    let queue = Arc::new(InMemoryQueue::new());
    let store = Arc::new(InMemoryDocumentStore::new());
    let vectors = Arc::new(InMemoryVectorStore::new());

    let worker = PipelineWorker::new(
        queue.clone(),
        store.clone(),
        embedding,
        vectors.clone(),
        chunking_from_config(&config),
        Duration::from_millis(config.queue.poll_interval_ms),
        config.queue.max_batch_size,
    );

    match cli.file {
        Some(path) => {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "document".to_string());
            let bytes = std::fs::read(&path)?;
            info!(file = %path.display(), size = bytes.len(), "processing local file");

            store.put_source(&cli.knowledge_base_id, &filename, bytes);
            for stage in [JobStage::Uploaded, JobStage::Parse, JobStage::Chunk, JobStage::Embed] {
                let mut payload =
                    JobPayload::new(stage, &cli.knowledge_base_id, &cli.agent_id, "local");
                payload.max_attempts = config.queue.max_attempts;
                payload.filename = Some(filename.clone());
                queue.push(payload.to_body()?);

                // Drain this stage (including retries) before enqueuing the next.
                while !queue.is_empty() {
                    if worker.drain_available().await == 0 {
                        tokio::time::sleep(Duration::from_millis(config.queue.poll_interval_ms))
                            .await;
                    }
                }
                if let Some((DocumentStatus::Failed, _)) = store.status_of(&cli.knowledge_base_id) {
                    break;
                }
            }

            let collection = ragbase_rag::agent_collection(&cli.agent_id);
            info!(
                status = ?store.status_of(&cli.knowledge_base_id),
                chunks = store.chunk_count(&cli.knowledge_base_id),
                vectors = vectors.point_count(&collection),
                dead_letters = queue.dead_letters().len(),
                "local run finished"
            );
        }
        None => {
            let cancel = CancellationToken::new();
            let stopper = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("shutdown signal received");
                    stopper.cancel();
                }
            });
            worker.run(cancel).await;
        }
    }

    Ok(())
}
