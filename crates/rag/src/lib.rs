pub mod prompt;
pub mod service;
pub mod store;

pub use service::{index_chunks, EmbeddingService, RagError, RagService};
pub use store::{
    agent_collection, InMemoryVectorStore, ScoredPoint, SearchParams, StoreError, VectorPoint,
    VectorStore,
};
