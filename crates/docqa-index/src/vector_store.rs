use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("collection not found: {0}")]
    NotFound(String),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt index: {0}")]
    Corrupt(String),
}

/// One chunk as stored in a collection.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub id: String,
    pub score: f32,
    pub text: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait VectorStore: Send + Sync {
    /// Drop the collection if it exists, then create it empty with `dimension`.
    fn reset_collection(
        &self,
        collection: &str,
        dimension: usize,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>>;

    /// Deleting a missing collection is not an error.
    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    /// Append entries after those already present.
    fn add(
        &self,
        collection: &str,
        entries: Vec<IndexEntry>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    /// The `k` entries most similar to `vector` by cosine similarity, nearest
    /// first; ties keep insertion order.
    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        k: usize,
    ) -> BoxFuture<'_, Result<Vec<ScoredEntry>, VectorStoreError>>;

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<usize, VectorStoreError>>;

    /// Atomically replace `live` with `staging`. `staging` no longer exists afterwards.
    fn promote_collection(
        &self,
        staging: &str,
        live: &str,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Sort by descending score; `sort_by` is stable, so equal scores keep their order.
pub(crate) fn rank(scored: &mut Vec<ScoredEntry>, k: usize) {
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(k);
}
