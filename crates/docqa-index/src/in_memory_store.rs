use std::collections::HashMap;
use std::sync::RwLock;

use crate::vector_store::{
    BoxFuture, IndexEntry, ScoredEntry, VectorStore, VectorStoreError, cosine_similarity, rank,
};

struct InMemoryCollection {
    dimension: usize,
    entries: Vec<IndexEntry>,
}

/// Non-persistent [`VectorStore`] with the same semantics as the SQLite store.
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, InMemoryCollection>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore").finish_non_exhaustive()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> VectorStoreError {
    VectorStoreError::Corrupt(format!("lock poisoned: {e}"))
}

impl VectorStore for InMemoryVectorStore {
    fn reset_collection(
        &self,
        collection: &str,
        dimension: usize,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self.collections.write().map_err(poisoned)?;
            cols.insert(
                collection,
                InMemoryCollection {
                    dimension,
                    entries: Vec::new(),
                },
            );
            Ok(())
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self.collections.read().map_err(poisoned)?;
            Ok(cols.contains_key(&collection))
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self.collections.write().map_err(poisoned)?;
            cols.remove(&collection);
            Ok(())
        })
    }

    fn add(
        &self,
        collection: &str,
        entries: Vec<IndexEntry>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self.collections.write().map_err(poisoned)?;
            let col = cols
                .get_mut(&collection)
                .ok_or(VectorStoreError::NotFound(collection))?;
            if let Some(bad) = entries.iter().find(|e| e.vector.len() != col.dimension) {
                return Err(VectorStoreError::DimensionMismatch {
                    expected: col.dimension,
                    actual: bad.vector.len(),
                });
            }
            col.entries.extend(entries);
            Ok(())
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        k: usize,
    ) -> BoxFuture<'_, Result<Vec<ScoredEntry>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self.collections.read().map_err(poisoned)?;
            let col = cols
                .get(&collection)
                .ok_or(VectorStoreError::NotFound(collection))?;
            if vector.len() != col.dimension {
                return Err(VectorStoreError::DimensionMismatch {
                    expected: col.dimension,
                    actual: vector.len(),
                });
            }

            let mut scored: Vec<ScoredEntry> = col
                .entries
                .iter()
                .map(|e| ScoredEntry {
                    id: e.id.clone(),
                    score: cosine_similarity(&vector, &e.vector),
                    text: e.text.clone(),
                    metadata: e.metadata.clone(),
                })
                .collect();
            rank(&mut scored, k);
            Ok(scored)
        })
    }

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<usize, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self.collections.read().map_err(poisoned)?;
            cols.get(&collection)
                .map(|c| c.entries.len())
                .ok_or(VectorStoreError::NotFound(collection))
        })
    }

    fn promote_collection(
        &self,
        staging: &str,
        live: &str,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let staging = staging.to_owned();
        let live = live.to_owned();
        Box::pin(async move {
            let mut cols = self.collections.write().map_err(poisoned)?;
            let promoted = cols
                .remove(&staging)
                .ok_or(VectorStoreError::NotFound(staging))?;
            cols.insert(live, promoted);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            id: id.into(),
            vector,
            text: format!("text {id}"),
            metadata: HashMap::from([("source".into(), serde_json::json!("a.pdf"))]),
        }
    }

    #[tokio::test]
    async fn reset_then_exists() {
        let store = InMemoryVectorStore::new();
        assert!(!store.collection_exists("docs").await.unwrap());
        store.reset_collection("docs", 3).await.unwrap();
        assert!(store.collection_exists("docs").await.unwrap());
        assert_eq!(store.count("docs").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reset_clears_existing_entries() {
        let store = InMemoryVectorStore::new();
        store.reset_collection("docs", 2).await.unwrap();
        store
            .add("docs", vec![entry("a", vec![1.0, 0.0])])
            .await
            .unwrap();
        store.reset_collection("docs", 2).await.unwrap();
        assert_eq!(store.count("docs").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn add_to_missing_collection_fails() {
        let store = InMemoryVectorStore::new();
        let err = store
            .add("nope", vec![entry("a", vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn add_wrong_dimension_fails_without_partial_write() {
        let store = InMemoryVectorStore::new();
        store.reset_collection("docs", 2).await.unwrap();
        let err = store
            .add(
                "docs",
                vec![entry("a", vec![1.0, 0.0]), entry("b", vec![1.0])],
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
        assert_eq!(store.count("docs").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn search_orders_by_similarity() {
        let store = InMemoryVectorStore::new();
        store.reset_collection("docs", 3).await.unwrap();
        store
            .add(
                "docs",
                vec![
                    entry("a", vec![1.0, 0.0, 0.0]),
                    entry("b", vec![0.0, 1.0, 0.0]),
                    entry("c", vec![0.9, 0.1, 0.0]),
                ],
            )
            .await
            .unwrap();

        let results = store.search("docs", vec![1.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert_eq!(results[1].id, "c");
        assert!(results[0].score >= results[1].score);
        assert_eq!(results[0].text, "text a");
        assert_eq!(results[0].metadata["source"], "a.pdf");
    }

    #[tokio::test]
    async fn search_returns_fewer_than_k() {
        let store = InMemoryVectorStore::new();
        store.reset_collection("docs", 2).await.unwrap();
        store
            .add("docs", vec![entry("a", vec![1.0, 0.0])])
            .await
            .unwrap();
        let results = store.search("docs", vec![1.0, 0.0], 10).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn search_ties_keep_insertion_order() {
        let store = InMemoryVectorStore::new();
        store.reset_collection("docs", 2).await.unwrap();
        store
            .add(
                "docs",
                vec![
                    entry("first", vec![1.0, 0.0]),
                    entry("second", vec![2.0, 0.0]),
                    entry("third", vec![3.0, 0.0]),
                ],
            )
            .await
            .unwrap();
        let results = store.search("docs", vec![1.0, 0.0], 3).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn search_missing_collection_fails() {
        let store = InMemoryVectorStore::new();
        let err = store.search("nope", vec![1.0], 3).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn search_wrong_dimension_fails() {
        let store = InMemoryVectorStore::new();
        store.reset_collection("docs", 2).await.unwrap();
        let err = store.search("docs", vec![1.0], 3).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn promote_replaces_live() {
        let store = InMemoryVectorStore::new();
        store.reset_collection("docs", 2).await.unwrap();
        store
            .add("docs", vec![entry("old", vec![1.0, 0.0])])
            .await
            .unwrap();
        store.reset_collection("docs__staging", 3).await.unwrap();
        store
            .add("docs__staging", vec![entry("new", vec![0.0, 0.0, 1.0])])
            .await
            .unwrap();

        store
            .promote_collection("docs__staging", "docs")
            .await
            .unwrap();

        assert!(!store.collection_exists("docs__staging").await.unwrap());
        let results = store.search("docs", vec![0.0, 0.0, 1.0], 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "new");
    }

    #[tokio::test]
    async fn promote_missing_staging_keeps_live() {
        let store = InMemoryVectorStore::new();
        store.reset_collection("docs", 2).await.unwrap();
        let err = store
            .promote_collection("docs__staging", "docs")
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::NotFound(_)));
        assert!(store.collection_exists("docs").await.unwrap());
    }

    #[tokio::test]
    async fn delete_collection_is_idempotent() {
        let store = InMemoryVectorStore::new();
        store.reset_collection("docs", 2).await.unwrap();
        store.delete_collection("docs").await.unwrap();
        store.delete_collection("docs").await.unwrap();
        assert!(!store.collection_exists("docs").await.unwrap());
    }

    #[test]
    fn debug_format() {
        let store = InMemoryVectorStore::new();
        assert!(format!("{store:?}").contains("InMemoryVectorStore"));
    }
}
