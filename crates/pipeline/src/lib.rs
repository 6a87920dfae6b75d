pub mod consumer;
pub mod job;
pub mod status;
pub mod worker;

pub use consumer::{InMemoryQueue, QueueConsumer, QueueError, QueueHealth, QueueMessage};
pub use job::{JobPayload, JobStage};
pub use status::{DocumentStatus, DocumentStore, InMemoryDocumentStore, SourceFile, StoreError};
pub use worker::{PipelineError, PipelineWorker};
