use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};

use crate::vector_store::{
    BoxFuture, IndexEntry, ScoredEntry, VectorStore, VectorStoreError, cosine_similarity, rank,
};

/// File name of the index database inside the index directory.
pub const INDEX_FILE: &str = "index.db";

/// Persistent [`VectorStore`] backed by a single `SQLite` file.
///
/// Vectors are stored as little-endian `f32` blobs and searched with an exact
/// cosine scan over the collection.
#[derive(Debug, Clone)]
pub struct SqliteVectorStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteVectorStore {
    /// Open (or create) `<dir>/index.db` and run migrations.
    ///
    /// Foreign keys are enabled per connection so that dropping or renaming a
    /// collection cascades to its entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, the database cannot
    /// be opened, or migrations fail.
    pub async fn open(dir: &Path) -> Result<Self, VectorStoreError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| VectorStoreError::Database(sqlx::Error::Io(e)))?;
        let path = dir.join(INDEX_FILE);

        let opts = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;

        sqlx::migrate!("../../migrations").run(&pool).await?;

        tracing::debug!(path = %path.display(), "opened vector index");
        Ok(Self { pool, path })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn dimension(&self, collection: &str) -> Result<usize, VectorStoreError> {
        let dim: Option<i64> =
            sqlx::query_scalar("SELECT dimension FROM collections WHERE name = ?")
                .bind(collection)
                .fetch_optional(&self.pool)
                .await?;
        let dim = dim.ok_or_else(|| VectorStoreError::NotFound(collection.to_owned()))?;
        usize::try_from(dim)
            .map_err(|_| VectorStoreError::Corrupt(format!("invalid dimension {dim}")))
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>, VectorStoreError> {
    if bytes.len() % 4 != 0 {
        return Err(VectorStoreError::Corrupt(format!(
            "vector blob of {} bytes is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

impl VectorStore for SqliteVectorStore {
    fn reset_collection(
        &self,
        collection: &str,
        dimension: usize,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let dim = i64::try_from(dimension)
                .map_err(|_| VectorStoreError::Corrupt(format!("dimension {dimension} too large")))?;
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM collections WHERE name = ?")
                .bind(&collection)
                .execute(&mut *tx)
                .await?;
            sqlx::query("INSERT INTO collections (name, dimension) VALUES (?, ?)")
                .bind(&collection)
                .bind(dim)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(())
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM collections WHERE name = ?")
                .bind(&collection)
                .fetch_optional(&self.pool)
                .await?;
            Ok(found.is_some())
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            sqlx::query("DELETE FROM collections WHERE name = ?")
                .bind(&collection)
                .execute(&self.pool)
                .await?;
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
            let dimension = self.dimension(&collection).await?;
            if let Some(bad) = entries.iter().find(|e| e.vector.len() != dimension) {
                return Err(VectorStoreError::DimensionMismatch {
                    expected: dimension,
                    actual: bad.vector.len(),
                });
            }

            let mut tx = self.pool.begin().await?;
            let mut position: i64 = sqlx::query_scalar(
                "SELECT COALESCE(MAX(position) + 1, 0) FROM entries WHERE collection = ?",
            )
            .bind(&collection)
            .fetch_one(&mut *tx)
            .await?;

            for entry in &entries {
                let metadata = serde_json::to_string(&entry.metadata)?;
                sqlx::query(
                    "INSERT INTO entries (collection, position, id, text, metadata, vector) \
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(&collection)
                .bind(position)
                .bind(&entry.id)
                .bind(&entry.text)
                .bind(metadata)
                .bind(encode_vector(&entry.vector))
                .execute(&mut *tx)
                .await?;
                position += 1;
            }
            tx.commit().await?;
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
            let dimension = self.dimension(&collection).await?;
            if vector.len() != dimension {
                return Err(VectorStoreError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }

            let rows: Vec<(String, String, String, Vec<u8>)> = sqlx::query_as(
                "SELECT id, text, metadata, vector FROM entries \
                 WHERE collection = ? ORDER BY position",
            )
            .bind(&collection)
            .fetch_all(&self.pool)
            .await?;

            let mut scored = Vec::with_capacity(rows.len());
            for (id, text, metadata, blob) in rows {
                let stored = decode_vector(&blob)?;
                if stored.len() != dimension {
                    return Err(VectorStoreError::Corrupt(format!(
                        "entry {id} has {} dimensions, collection has {dimension}",
                        stored.len()
                    )));
                }
                let metadata: HashMap<String, serde_json::Value> = serde_json::from_str(&metadata)?;
                scored.push(ScoredEntry {
                    id,
                    score: cosine_similarity(&vector, &stored),
                    text,
                    metadata,
                });
            }
            rank(&mut scored, k);
            Ok(scored)
        })
    }

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<usize, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.dimension(&collection).await?;
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE collection = ?")
                .bind(&collection)
                .fetch_one(&self.pool)
                .await?;
            usize::try_from(count)
                .map_err(|_| VectorStoreError::Corrupt(format!("invalid entry count {count}")))
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
            let mut tx = self.pool.begin().await?;
            let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM collections WHERE name = ?")
                .bind(&staging)
                .fetch_optional(&mut *tx)
                .await?;
            if found.is_none() {
                return Err(VectorStoreError::NotFound(staging));
            }
            sqlx::query("DELETE FROM collections WHERE name = ?")
                .bind(&live)
                .execute(&mut *tx)
                .await?;
            // entries follow through ON UPDATE CASCADE
            sqlx::query("UPDATE collections SET name = ? WHERE name = ?")
                .bind(&live)
                .bind(&staging)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            tracing::debug!(staging = %staging, live = %live, "promoted collection");
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
            metadata: HashMap::from([
                ("source".into(), serde_json::json!("a.pdf")),
                ("page".into(), serde_json::json!(2)),
            ]),
        }
    }

    async fn open_temp() -> (tempfile::TempDir, SqliteVectorStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::open(&dir.path().join("index"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn creates_index_file_with_wal() {
        let (dir, store) = open_temp().await;
        assert!(dir.path().join("index").join(INDEX_FILE).exists());
        assert_eq!(store.path(), dir.path().join("index").join(INDEX_FILE));

        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(mode, "wal");
    }

    #[tokio::test]
    async fn add_and_search_round_trip_metadata() {
        let (_dir, store) = open_temp().await;
        store.reset_collection("docs", 3).await.unwrap();
        store
            .add(
                "docs",
                vec![
                    entry("a", vec![1.0, 0.0, 0.0]),
                    entry("b", vec![0.0, 1.0, 0.0]),
                    entry("c", vec![0.7, 0.7, 0.0]),
                ],
            )
            .await
            .unwrap();
        assert_eq!(store.count("docs").await.unwrap(), 3);

        let results = store.search("docs", vec![1.0, 0.1, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert_eq!(results[1].id, "c");
        assert_eq!(results[0].text, "text a");
        assert_eq!(results[0].metadata["page"], 2);
    }

    #[tokio::test]
    async fn add_appends_after_existing_entries() {
        let (_dir, store) = open_temp().await;
        store.reset_collection("docs", 2).await.unwrap();
        store
            .add("docs", vec![entry("first", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .add("docs", vec![entry("second", vec![1.0, 0.0])])
            .await
            .unwrap();

        let results = store.search("docs", vec![1.0, 0.0], 5).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn missing_collection_is_not_found() {
        let (_dir, store) = open_temp().await;
        assert!(!store.collection_exists("docs").await.unwrap());
        assert!(matches!(
            store.search("docs", vec![1.0], 3).await.unwrap_err(),
            VectorStoreError::NotFound(_)
        ));
        assert!(matches!(
            store.add("docs", vec![entry("a", vec![1.0])]).await.unwrap_err(),
            VectorStoreError::NotFound(_)
        ));
        assert!(matches!(
            store.count("docs").await.unwrap_err(),
            VectorStoreError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn dimension_mismatch_rejected() {
        let (_dir, store) = open_temp().await;
        store.reset_collection("docs", 2).await.unwrap();
        let err = store
            .add("docs", vec![entry("a", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        assert_eq!(store.count("docs").await.unwrap(), 0);

        let err = store.search("docs", vec![1.0], 1).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn reset_drops_entries_and_changes_dimension() {
        let (_dir, store) = open_temp().await;
        store.reset_collection("docs", 2).await.unwrap();
        store
            .add("docs", vec![entry("a", vec![1.0, 0.0])])
            .await
            .unwrap();
        store.reset_collection("docs", 4).await.unwrap();
        assert_eq!(store.count("docs").await.unwrap(), 0);
        store
            .add("docs", vec![entry("b", vec![1.0, 0.0, 0.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(store.count("docs").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn promote_swaps_collections() {
        let (_dir, store) = open_temp().await;
        store.reset_collection("docs", 2).await.unwrap();
        store
            .add("docs", vec![entry("old", vec![1.0, 0.0])])
            .await
            .unwrap();
        store.reset_collection("docs__staging", 2).await.unwrap();
        store
            .add(
                "docs__staging",
                vec![entry("new1", vec![0.0, 1.0]), entry("new2", vec![1.0, 1.0])],
            )
            .await
            .unwrap();

        store
            .promote_collection("docs__staging", "docs")
            .await
            .unwrap();

        assert!(!store.collection_exists("docs__staging").await.unwrap());
        assert_eq!(store.count("docs").await.unwrap(), 2);
        let results = store.search("docs", vec![0.0, 1.0], 5).await.unwrap();
        assert!(results.iter().all(|r| r.id.starts_with("new")));

        let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(orphans, 2);
    }

    #[tokio::test]
    async fn promote_without_staging_keeps_live() {
        let (_dir, store) = open_temp().await;
        store.reset_collection("docs", 2).await.unwrap();
        store
            .add("docs", vec![entry("old", vec![1.0, 0.0])])
            .await
            .unwrap();
        let err = store
            .promote_collection("docs__staging", "docs")
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::NotFound(_)));
        assert_eq!(store.count("docs").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn contents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let index_dir = dir.path().join("index");
        {
            let store = SqliteVectorStore::open(&index_dir).await.unwrap();
            store.reset_collection("docs", 2).await.unwrap();
            store
                .add("docs", vec![entry("kept", vec![0.5, 0.5])])
                .await
                .unwrap();
            store.pool().close().await;
        }

        let store = SqliteVectorStore::open(&index_dir).await.unwrap();
        assert!(store.collection_exists("docs").await.unwrap());
        let results = store.search("docs", vec![0.5, 0.5], 1).await.unwrap();
        assert_eq!(results[0].id, "kept");
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn delete_collection_cascades() {
        let (_dir, store) = open_temp().await;
        store.reset_collection("docs", 2).await.unwrap();
        store
            .add("docs", vec![entry("a", vec![1.0, 0.0])])
            .await
            .unwrap();
        store.delete_collection("docs").await.unwrap();
        store.delete_collection("docs").await.unwrap();
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn vector_blob_encoding() {
        let v = vec![1.5_f32, -2.0, 0.0];
        let bytes = encode_vector(&v);
        assert_eq!(bytes.len(), 12);
        assert_eq!(decode_vector(&bytes).unwrap(), v);
        assert!(matches!(
            decode_vector(&[0, 1, 2]),
            Err(VectorStoreError::Corrupt(_))
        ));
    }
}
