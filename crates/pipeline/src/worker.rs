//! Stage-routing worker: poll → route → process → ack/nack/dead-letter.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ragbase_core::ProviderError;
use ragbase_ingest::document::ExtractionError;
use ragbase_ingest::{chunk_pages, extract_text, ChunkingOptions};
use ragbase_rag::service::index_chunks;
use ragbase_rag::{EmbeddingService, RagError, VectorStore};

use crate::consumer::{QueueConsumer, QueueError, QueueMessage};
use crate::job::{JobPayload, JobStage};
use crate::status::{DocumentStatus, DocumentStore, StoreError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid job payload: {0}")]
    Payload(String),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Rag(#[from] RagError),

    #[error("document store: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl PipelineError {
    /// Whether redelivering the job can help. Drives nack vs dead-letter.
    pub fn retryable(&self) -> bool {
        match self {
            PipelineError::Payload(_) => false,
            PipelineError::Extraction(_) => false,
            PipelineError::Provider(err) => err.retryable(),
            PipelineError::Rag(err) => err.retryable(),
            PipelineError::Store(err) => err.retryable(),
            PipelineError::Queue(_) => true,
        }
    }

    /// Stable code recorded on the failed document.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Payload(_) => "INVALID_PAYLOAD",
            PipelineError::Extraction(_) => "EXTRACTION_FAILED",
            PipelineError::Provider(err) => err.code(),
            PipelineError::Rag(RagError::Provider(err)) => err.code(),
            PipelineError::Rag(RagError::Store(_)) => "VECTOR_STORE_ERROR",
            PipelineError::Store(_) => "STORE_ERROR",
            PipelineError::Queue(_) => "QUEUE_ERROR",
        }
    }
}

/// Progress a document sits at when the given stage begins.
fn stage_progress(stage: JobStage) -> u8 {
    match stage {
        JobStage::Uploaded => 0,
        JobStage::Parse => 25,
        JobStage::Chunk => 50,
        JobStage::Embed => 75,
    }
}

/// Processes queued jobs against the injected collaborators. One worker per
/// process; jobs within a document run one stage at a time.
pub struct PipelineWorker {
    consumer: Arc<dyn QueueConsumer>,
    store: Arc<dyn DocumentStore>,
    embedding: Arc<EmbeddingService>,
    vectors: Arc<dyn VectorStore>,
    chunking: ChunkingOptions,
    poll_interval: Duration,
    max_poll_batch: u32,
}

impl PipelineWorker {
    pub fn new(
        consumer: Arc<dyn QueueConsumer>,
        store: Arc<dyn DocumentStore>,
        embedding: Arc<EmbeddingService>,
        vectors: Arc<dyn VectorStore>,
        chunking: ChunkingOptions,
        poll_interval: Duration,
        max_poll_batch: u32,
    ) -> Self {
        Self {
            consumer,
            store,
            embedding,
            vectors,
            chunking,
            poll_interval,
            max_poll_batch,
        }
    }

    /// Poll until cancelled, sleeping `poll_interval` between empty polls.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "pipeline worker started"
        );
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let processed = self.drain_available().await;
            if processed == 0 {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }
        info!("pipeline worker stopped");
    }

    /// Poll one batch and process every message in it. Returns how many
    /// messages were handled.
    pub async fn drain_available(&self) -> usize {
        let messages = match self.consumer.poll_batch(self.max_poll_batch).await {
            Ok(messages) => messages,
            Err(err) => {
                warn!(error = %err, "queue poll failed");
                return 0;
            }
        };
        let count = messages.len();
        for message in &messages {
            self.process_message(message).await;
        }
        count
    }

    async fn process_message(&self, message: &QueueMessage) {
        let payload = match JobPayload::from_json(&message.body) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(message_id = %message.id, error = %err, "dead-lettering unparseable job");
                if let Err(e) = self.consumer.dead_letter(&message.receipt_handle).await {
                    warn!(message_id = %message.id, error = %e, "failed to dead-letter");
                }
                return;
            }
        };

        match self.handle_stage(&payload).await {
            Ok(()) => {
                info!(
                    job_id = %payload.job_id,
                    stage = %payload.stage,
                    knowledge_base_id = %payload.knowledge_base_id,
                    "job completed"
                );
                if let Err(e) = self.consumer.ack(&message.receipt_handle).await {
                    warn!(job_id = %payload.job_id, error = %e, "failed to ack");
                }
            }
            Err(err) => self.handle_failure(message, &payload, err).await,
        }
    }

    async fn handle_failure(&self, message: &QueueMessage, payload: &JobPayload, err: PipelineError) {
        let attempts = message.attempt_count.max(payload.attempt);
        if err.retryable() && attempts < payload.max_attempts {
            warn!(
                job_id = %payload.job_id,
                stage = %payload.stage,
                attempt = attempts,
                max_attempts = payload.max_attempts,
                error = %err,
                "transient job failure, nacking for redelivery"
            );
            if let Err(e) = self.consumer.nack(&message.receipt_handle).await {
                warn!(job_id = %payload.job_id, error = %e, "failed to nack");
            }
            return;
        }

        warn!(
            job_id = %payload.job_id,
            stage = %payload.stage,
            attempt = attempts,
            code = err.code(),
            error = %err,
            "job failed permanently, dead-lettering"
        );
        let kb = &payload.knowledge_base_id;
        if let Err(e) = self.store.record_error(kb, err.code(), &err.to_string()).await {
            warn!(knowledge_base_id = %kb, error = %e, "failed to record error");
        }
        if let Err(e) = self
            .store
            .update_status(kb, DocumentStatus::Failed, stage_progress(payload.stage))
            .await
        {
            warn!(knowledge_base_id = %kb, error = %e, "failed to mark document failed");
        }
        if let Err(e) = self.consumer.dead_letter(&message.receipt_handle).await {
            warn!(job_id = %payload.job_id, error = %e, "failed to dead-letter");
        }
    }

    /// Run one stage. Each stage reads the previous stage's output from the
    /// store and writes its own, leaving earlier outputs untouched.
    async fn handle_stage(&self, payload: &JobPayload) -> Result<(), PipelineError> {
        let kb = &payload.knowledge_base_id;
        match payload.stage {
            JobStage::Uploaded => {
                self.store.load_source(kb).await?;
                self.store
                    .update_status(kb, DocumentStatus::Processing, 10)
                    .await?;
            }
            JobStage::Parse => {
                let source = self.store.load_source(kb).await?;
                let document = extract_text(&source.bytes, &source.filename)?;
                info!(
                    knowledge_base_id = %kb,
                    filename = %document.filename,
                    pages = document.pages.len(),
                    "document parsed"
                );
                self.store.save_pages(kb, &document.pages).await?;
                self.store
                    .update_status(kb, DocumentStatus::Processing, 40)
                    .await?;
            }
            JobStage::Chunk => {
                self.store
                    .update_status(kb, DocumentStatus::Chunking, 50)
                    .await?;
                let pages = self.store.load_pages(kb).await?;
                let chunks = chunk_pages(&pages, &self.chunking);
                info!(
                    knowledge_base_id = %kb,
                    chunks = chunks.len(),
                    strategy = ?self.chunking.strategy,
                    "document chunked"
                );
                self.store.save_chunks(kb, &chunks).await?;
                self.store
                    .update_status(kb, DocumentStatus::Chunking, 70)
                    .await?;
            }
            JobStage::Embed => {
                let chunks = self.store.load_chunks(kb).await?;
                let written = index_chunks(
                    &self.embedding,
                    self.vectors.as_ref(),
                    &payload.agent_id,
                    &chunks,
                )
                .await?;
                info!(
                    knowledge_base_id = %kb,
                    agent_id = %payload.agent_id,
                    vectors = written,
                    "chunks embedded and indexed"
                );
                self.store
                    .update_status(kb, DocumentStatus::Completed, 100)
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use ragbase_core::ErrorKind;
    use ragbase_ingest::{EmbeddingBatch, EmbeddingProvider, EmbeddingResult};
    use ragbase_rag::InMemoryVectorStore;

    use crate::consumer::InMemoryQueue;
    use crate::status::InMemoryDocumentStore;

    struct MockEmbedder;

    #[async_trait]
    impl EmbeddingProvider for MockEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            Ok(vec![text.len() as f32, 1.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatch, ProviderError> {
            Ok(EmbeddingBatch {
                embeddings: texts
                    .iter()
                    .enumerate()
                    .map(|(index, text)| EmbeddingResult {
                        embedding: vec![text.len() as f32, 1.0],
                        index,
                        token_count: None,
                    })
                    .collect(),
                model: "mock-embed".into(),
                dimensions: 2,
                usage: None,
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &'static str {
            "mock"
        }

        fn model(&self) -> &str {
            "mock-embed"
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            Err(ProviderError::new(
                "mock",
                ErrorKind::Server { status: 500 },
                "embedding backend down",
            ))
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<EmbeddingBatch, ProviderError> {
            Err(ProviderError::new(
                "mock",
                ErrorKind::Server { status: 500 },
                "embedding backend down",
            ))
        }

        async fn health_check(&self) -> bool {
            false
        }

        fn name(&self) -> &'static str {
            "mock"
        }

        fn model(&self) -> &str {
            "mock-embed"
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    struct Harness {
        queue: Arc<InMemoryQueue>,
        store: Arc<InMemoryDocumentStore>,
        vectors: Arc<InMemoryVectorStore>,
        worker: PipelineWorker,
    }

    fn harness(embedder: Arc<dyn EmbeddingProvider>) -> Harness {
        let queue = Arc::new(InMemoryQueue::new());
        let store = Arc::new(InMemoryDocumentStore::new());
        let vectors = Arc::new(InMemoryVectorStore::new());
        let worker = PipelineWorker::new(
            queue.clone(),
            store.clone(),
            Arc::new(EmbeddingService::new(embedder, None)),
            vectors.clone(),
            ChunkingOptions::default(),
            Duration::from_millis(10),
            10,
        );
        Harness {
            queue,
            store,
            vectors,
            worker,
        }
    }

    fn push_job(queue: &InMemoryQueue, stage: JobStage, max_attempts: u32) {
        let mut payload = JobPayload::new(stage, "kb-1", "a1", "u1");
        payload.max_attempts = max_attempts;
        queue.push(payload.to_body().unwrap());
    }

    const SOURCE: &[u8] = b"The first paragraph talks about the weather in considerable \
detail, covering wind, rain, and the forecast for the coming week.\n\nThe second \
paragraph changes topic entirely and describes the harvest, the orchards, and the \
work still left before winter arrives.";

    #[tokio::test]
    async fn document_flows_through_all_four_stages() {
        let h = harness(Arc::new(MockEmbedder));
        h.store.put_source("kb-1", "notes.txt", SOURCE.to_vec());

        push_job(&h.queue, JobStage::Uploaded, 3);
        assert_eq!(h.worker.drain_available().await, 1);
        assert_eq!(
            h.store.status_of("kb-1"),
            Some((DocumentStatus::Processing, 10))
        );

        push_job(&h.queue, JobStage::Parse, 3);
        h.worker.drain_available().await;
        assert_eq!(
            h.store.status_of("kb-1"),
            Some((DocumentStatus::Processing, 40))
        );

        push_job(&h.queue, JobStage::Chunk, 3);
        h.worker.drain_available().await;
        assert_eq!(
            h.store.status_of("kb-1"),
            Some((DocumentStatus::Chunking, 70))
        );
        assert!(h.store.chunk_count("kb-1") > 0);

        push_job(&h.queue, JobStage::Embed, 3);
        h.worker.drain_available().await;
        assert_eq!(
            h.store.status_of("kb-1"),
            Some((DocumentStatus::Completed, 100))
        );
        assert_eq!(h.vectors.point_count("agent_a1"), h.store.chunk_count("kb-1"));

        assert!(h.queue.is_empty());
        assert!(h.queue.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn retryable_failure_nacks_until_attempts_exhaust_then_dead_letters() {
        let h = harness(Arc::new(FailingEmbedder));
        h.store.put_source("kb-1", "notes.txt", SOURCE.to_vec());
        h.store
            .save_chunks(
                "kb-1",
                &[ragbase_ingest::ChunkRecord::new(
                    "some chunk".into(),
                    Default::default(),
                )],
            )
            .await
            .unwrap();

        push_job(&h.queue, JobStage::Embed, 2);

        // First delivery: retryable, attempt 1 of 2 — nacked, not dead.
        h.worker.drain_available().await;
        assert!(h.queue.dead_letters().is_empty());
        assert!(!h.queue.is_empty());

        // Second delivery exhausts the budget.
        h.worker.drain_available().await;
        let dead = h.queue.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(
            h.store.status_of("kb-1"),
            Some((DocumentStatus::Failed, 75))
        );
        let (code, message) = h.store.error_of("kb-1").unwrap();
        assert_eq!(code, "SERVER_ERROR");
        assert!(message.contains("embedding backend down"));
    }

    #[tokio::test]
    async fn fatal_extraction_error_dead_letters_on_first_attempt() {
        let h = harness(Arc::new(MockEmbedder));
        h.store.put_source("kb-1", "slides.pptx", b"binary".to_vec());

        push_job(&h.queue, JobStage::Parse, 3);
        h.worker.drain_available().await;

        assert_eq!(h.queue.dead_letters().len(), 1);
        assert_eq!(
            h.store.status_of("kb-1"),
            Some((DocumentStatus::Failed, 25))
        );
        let (code, _) = h.store.error_of("kb-1").unwrap();
        assert_eq!(code, "EXTRACTION_FAILED");
    }

    #[tokio::test]
    async fn unparseable_payload_goes_straight_to_dead_letter() {
        let h = harness(Arc::new(MockEmbedder));
        h.queue.push("this is not a job");

        h.worker.drain_available().await;
        assert_eq!(h.queue.dead_letters().len(), 1);
    }

    #[tokio::test]
    async fn embed_of_empty_chunk_list_still_completes() {
        let h = harness(Arc::new(MockEmbedder));
        h.store.put_source("kb-1", "notes.txt", Vec::new());
        h.store.save_chunks("kb-1", &[]).await.unwrap();

        push_job(&h.queue, JobStage::Embed, 3);
        h.worker.drain_available().await;
        assert_eq!(
            h.store.status_of("kb-1"),
            Some((DocumentStatus::Completed, 100))
        );
        assert!(h.queue.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let h = harness(Arc::new(MockEmbedder));
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            stopper.cancel();
        });
        h.worker.run(cancel).await;
        handle.await.unwrap();
    }
}
