//! Vector-store collaborator boundary.
//!
//! The actual search backend (Qdrant, pgvector, ...) lives behind
//! [`VectorStore`]; this crate only depends on the trait. The in-memory
//! implementation exists for tests and local runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("invalid point: {0}")]
    InvalidPoint(String),

    #[error("provider error: {0}")]
    Provider(String),
}

/// Deterministic collection name for an agent's chunks.
pub fn agent_collection(agent_id: &str) -> String {
    format!("agent_{agent_id}")
}

/// One stored vector with its payload (chunk content + metadata).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: serde_json::Value,
}

/// A search hit, highest-similarity first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: Uuid,
    pub score: f32,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct SearchParams {
    pub limit: usize,
    /// Exact-match conditions on payload fields, all of which must hold.
    pub filter: Option<serde_json::Value>,
    /// Hits scoring below this are dropped.
    pub score_threshold: Option<f32>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            limit: 5,
            filter: None,
            score_threshold: None,
        }
    }
}

/// Contract for vector search backends.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace points by id. Creates the collection if needed.
    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<(), StoreError>;

    /// Similarity search, best matches first.
    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        params: &SearchParams,
    ) -> Result<Vec<ScoredPoint>, StoreError>;
}

// ── In-memory implementation ────────────────────────────────────────────────

/// Brute-force cosine-similarity store for tests and local runs.
pub struct InMemoryVectorStore {
    collections: Mutex<HashMap<String, Vec<VectorPoint>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
        }
    }

    pub fn point_count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .map_or(0, Vec::len)
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn matches_filter(payload: &serde_json::Value, filter: &serde_json::Value) -> bool {
    match filter.as_object() {
        Some(conditions) => conditions
            .iter()
            .all(|(key, expected)| payload.get(key) == Some(expected)),
        None => true,
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<(), StoreError> {
        let mut collections = self.collections.lock().unwrap();
        let stored = collections.entry(collection.to_string()).or_default();
        for point in points {
            match stored.iter_mut().find(|p| p.id == point.id) {
                Some(existing) => *existing = point,
                None => stored.push(point),
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        params: &SearchParams,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let collections = self.collections.lock().unwrap();
        let stored = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        let mut scored: Vec<ScoredPoint> = stored
            .iter()
            .filter(|p| {
                params
                    .filter
                    .as_ref()
                    .map_or(true, |f| matches_filter(&p.payload, f))
            })
            .map(|p| ScoredPoint {
                id: p.id,
                score: cosine_similarity(query, &p.vector),
                payload: p.payload.clone(),
            })
            .filter(|p| params.score_threshold.map_or(true, |t| p.score >= t))
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(params.limit);
        Ok(scored)
    }
}
