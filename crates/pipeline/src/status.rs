//! Document store collaborator: source bytes in, stage outputs and status out.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ragbase_ingest::{ChunkRecord, PageContent};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// A missing document cannot appear by retrying; everything else can be
    /// transient.
    pub fn retryable(&self) -> bool {
        !matches!(self, StoreError::NotFound(_))
    }
}

/// Document processing states, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Chunking,
    Completed,
    Failed,
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Chunking => "chunking",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Uploaded source file awaiting extraction.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Persistence collaborator for the pipeline. Each stage loads its input
/// from here and writes its output back, so a failed stage never corrupts
/// the previous stage's result.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load_source(&self, knowledge_base_id: &str) -> Result<SourceFile, StoreError>;

    async fn save_pages(
        &self,
        knowledge_base_id: &str,
        pages: &[PageContent],
    ) -> Result<(), StoreError>;

    async fn load_pages(&self, knowledge_base_id: &str) -> Result<Vec<PageContent>, StoreError>;

    /// Replace the document's chunk list wholesale.
    async fn save_chunks(
        &self,
        knowledge_base_id: &str,
        chunks: &[ChunkRecord],
    ) -> Result<(), StoreError>;

    async fn load_chunks(&self, knowledge_base_id: &str) -> Result<Vec<ChunkRecord>, StoreError>;

    /// Record a status transition with 0–100 progress.
    async fn update_status(
        &self,
        knowledge_base_id: &str,
        status: DocumentStatus,
        progress: u8,
    ) -> Result<(), StoreError>;

    /// Attach a terminal error to the document.
    async fn record_error(
        &self,
        knowledge_base_id: &str,
        code: &str,
        message: &str,
    ) -> Result<(), StoreError>;
}

// ── In-memory implementation ────────────────────────────────────────────────

#[derive(Debug, Default, Clone)]
struct DocumentEntry {
    source: Option<SourceFile>,
    pages: Vec<PageContent>,
    chunks: Vec<ChunkRecord>,
    status: Option<DocumentStatus>,
    progress: u8,
    error: Option<(String, String)>,
}

/// Map-backed store for tests and local runs.
pub struct InMemoryDocumentStore {
    documents: Mutex<HashMap<String, DocumentEntry>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
        }
    }

    /// Seed an uploaded source file (what the upload handler would persist).
    pub fn put_source(&self, knowledge_base_id: &str, filename: &str, bytes: Vec<u8>) {
        let mut documents = self.documents.lock().unwrap();
        let entry = documents.entry(knowledge_base_id.to_string()).or_default();
        entry.source = Some(SourceFile {
            filename: filename.to_string(),
            bytes,
        });
        entry.status = Some(DocumentStatus::Pending);
    }

    pub fn status_of(&self, knowledge_base_id: &str) -> Option<(DocumentStatus, u8)> {
        let documents = self.documents.lock().unwrap();
        documents
            .get(knowledge_base_id)
            .and_then(|e| e.status.map(|s| (s, e.progress)))
    }

    pub fn error_of(&self, knowledge_base_id: &str) -> Option<(String, String)> {
        let documents = self.documents.lock().unwrap();
        documents.get(knowledge_base_id).and_then(|e| e.error.clone())
    }

    pub fn chunk_count(&self, knowledge_base_id: &str) -> usize {
        let documents = self.documents.lock().unwrap();
        documents.get(knowledge_base_id).map_or(0, |e| e.chunks.len())
    }

    fn with_entry<T>(
        &self,
        knowledge_base_id: &str,
        f: impl FnOnce(&mut DocumentEntry) -> T,
    ) -> Result<T, StoreError> {
        let mut documents = self.documents.lock().unwrap();
        documents
            .get_mut(knowledge_base_id)
            .map(f)
            .ok_or_else(|| StoreError::NotFound(knowledge_base_id.to_string()))
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn load_source(&self, knowledge_base_id: &str) -> Result<SourceFile, StoreError> {
        self.with_entry(knowledge_base_id, |e| e.source.clone())?
            .ok_or_else(|| StoreError::NotFound(knowledge_base_id.to_string()))
    }

    async fn save_pages(
        &self,
        knowledge_base_id: &str,
        pages: &[PageContent],
    ) -> Result<(), StoreError> {
        self.with_entry(knowledge_base_id, |e| e.pages = pages.to_vec())
    }

    async fn load_pages(&self, knowledge_base_id: &str) -> Result<Vec<PageContent>, StoreError> {
        self.with_entry(knowledge_base_id, |e| e.pages.clone())
    }

    async fn save_chunks(
        &self,
        knowledge_base_id: &str,
        chunks: &[ChunkRecord],
    ) -> Result<(), StoreError> {
        self.with_entry(knowledge_base_id, |e| e.chunks = chunks.to_vec())
    }

    async fn load_chunks(&self, knowledge_base_id: &str) -> Result<Vec<ChunkRecord>, StoreError> {
        self.with_entry(knowledge_base_id, |e| e.chunks.clone())
    }

    async fn update_status(
        &self,
        knowledge_base_id: &str,
        status: DocumentStatus,
        progress: u8,
    ) -> Result<(), StoreError> {
        self.with_entry(knowledge_base_id, |e| {
            e.status = Some(status);
            e.progress = progress.min(100);
        })
    }

    async fn record_error(
        &self,
        knowledge_base_id: &str,
        code: &str,
        message: &str,
    ) -> Result<(), StoreError> {
        self.with_entry(knowledge_base_id, |e| {
            e.error = Some((code.to_string(), message.to_string()));
        })
    }
}
