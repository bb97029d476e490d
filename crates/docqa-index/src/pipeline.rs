use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::document::{
    Chunk, DEFAULT_MAX_FILE_SIZE, DocumentError, TextSplitter, loader_for, read_file,
};
use crate::embedder::Embedder;
use crate::error::RagError;
use crate::vector_store::{IndexEntry, VectorStore};

/// Suffix of the collection a new index is built in before it replaces the live one.
pub const STAGING_SUFFIX: &str = "__staging";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Received,
    Loaded,
    Split,
    Embedded,
    Indexed,
    Complete,
    Failed,
}

impl fmt::Display for IngestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::Loaded => "loaded",
            Self::Split => "split",
            Self::Embedded => "embedded",
            Self::Indexed => "indexed",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub source: String,
    /// Pages (or text documents) that produced text.
    pub pages: usize,
    pub chunks: usize,
    pub collection: String,
    pub dimension: usize,
}

struct Progress<'a> {
    source: &'a str,
    state: IngestState,
    started: Instant,
}

impl<'a> Progress<'a> {
    fn new(source: &'a str) -> Self {
        tracing::info!(source, state = %IngestState::Received, "ingestion started");
        Self {
            source,
            state: IngestState::Received,
            started: Instant::now(),
        }
    }

    fn advance(&mut self, next: IngestState) {
        tracing::debug!(
            source = self.source,
            from = %self.state,
            to = %next,
            elapsed_ms = self.started.elapsed().as_millis(),
            "ingestion state changed"
        );
        self.state = next;
    }
}

/// Load -> split -> embed -> index, replacing the live collection on success.
pub struct IngestionPipeline {
    splitter: TextSplitter,
    embedder: Embedder,
    store: Arc<dyn VectorStore>,
    collection: String,
    max_file_size: u64,
    write_lock: Mutex<()>,
}

impl IngestionPipeline {
    pub fn new(
        splitter: TextSplitter,
        embedder: Embedder,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            splitter,
            embedder,
            store,
            collection: collection.into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Ingest a local file. The format is taken from its extension.
    ///
    /// # Errors
    ///
    /// See [`IngestionPipeline::ingest_bytes`]; also fails if the file cannot be read.
    pub async fn ingest_path(&self, path: &Path) -> Result<IngestReport, RagError> {
        let bytes = read_file(path, self.max_file_size).await?;
        let filename = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        self.ingest_bytes(&filename, None, bytes).await
    }

    /// Ingest an uploaded file, replacing everything previously indexed.
    ///
    /// The new index is built in a staging collection and promoted in one
    /// transaction, so any failure leaves the previous index queryable.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Document`] for unsupported, oversized, unreadable or
    /// textless files, [`RagError::ProviderUnavailable`] if embedding fails, and
    /// [`RagError::VectorStore`] if the index cannot be written.
    pub async fn ingest_bytes(
        &self,
        filename: &str,
        content_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<IngestReport, RagError> {
        let mut progress = Progress::new(filename);
        match self.run(&mut progress, content_type, bytes).await {
            Ok(report) => {
                progress.advance(IngestState::Complete);
                tracing::info!(
                    source = filename,
                    pages = report.pages,
                    chunks = report.chunks,
                    dimension = report.dimension,
                    elapsed_ms = progress.started.elapsed().as_millis(),
                    "ingestion complete"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::warn!(source = filename, at = %progress.state, error = %e, "ingestion failed");
                progress.advance(IngestState::Failed);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        progress: &mut Progress<'_>,
        content_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<IngestReport, RagError> {
        let source = progress.source;
        let size = bytes.len() as u64;
        if size > self.max_file_size {
            return Err(DocumentError::FileTooLarge(size).into());
        }

        let loader = loader_for(source, content_type)?;
        let digest = blake3::hash(&bytes).to_hex();
        let documents = loader.load(source, bytes).await?;
        let documents: Vec<_> = documents
            .into_iter()
            .filter(|d| !d.content.trim().is_empty())
            .collect();
        if documents.is_empty() {
            return Err(DocumentError::EmptyDocument(source.to_owned()).into());
        }
        progress.advance(IngestState::Loaded);

        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|d| self.splitter.split(d))
            .filter(|c| !c.content.trim().is_empty())
            .enumerate()
            .map(|(i, chunk)| Chunk {
                chunk_index: i,
                ..chunk
            })
            .collect();
        if chunks.is_empty() {
            return Err(DocumentError::EmptyDocument(source.to_owned()).into());
        }
        progress.advance(IngestState::Split);

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        let dimension = vectors.first().map_or(0, Vec::len);
        progress.advance(IngestState::Embedded);

        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| index_entry(digest.as_str(), chunk, vector))
            .collect();
        let chunk_count = entries.len();

        self.replace_index(entries, dimension).await?;
        progress.advance(IngestState::Indexed);

        Ok(IngestReport {
            source: source.to_owned(),
            pages: documents.len(),
            chunks: chunk_count,
            collection: self.collection.clone(),
            dimension,
        })
    }

    async fn replace_index(
        &self,
        entries: Vec<IndexEntry>,
        dimension: usize,
    ) -> Result<(), RagError> {
        let staging = format!("{}{STAGING_SUFFIX}", self.collection);
        let _guard = self.write_lock.lock().await;

        let built = async {
            self.store.reset_collection(&staging, dimension).await?;
            self.store.add(&staging, entries).await?;
            self.store
                .promote_collection(&staging, &self.collection)
                .await
        }
        .await;

        if let Err(e) = built {
            if let Err(cleanup) = self.store.delete_collection(&staging).await {
                tracing::warn!(collection = %staging, error = %cleanup, "failed to drop staging collection");
            }
            return Err(e.into());
        }
        Ok(())
    }
}

fn index_entry(digest: &str, chunk: Chunk, vector: Vec<f32>) -> IndexEntry {
    let page = chunk.metadata.page();
    let key = format!(
        "{digest}:{}:{}-{}",
        page.unwrap_or(0),
        chunk.start,
        chunk.end
    );
    let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string();

    let mut metadata = std::collections::HashMap::from([
        ("source".to_owned(), json!(chunk.metadata.source)),
        ("content_type".to_owned(), json!(chunk.metadata.content_type)),
        ("chunk_index".to_owned(), json!(chunk.chunk_index)),
        ("start".to_owned(), json!(chunk.start)),
        ("end".to_owned(), json!(chunk.end)),
    ]);
    if let Some(page) = page {
        metadata.insert("page".to_owned(), json!(page));
    }

    IndexEntry {
        id,
        vector,
        text: chunk.content,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use docqa_llm::AnyProvider;
    use docqa_llm::mock::MockProvider;

    use super::*;
    use crate::document::SplitterConfig;
    use crate::in_memory_store::InMemoryVectorStore;

    fn pipeline_with(mock: MockProvider, store: Arc<dyn VectorStore>) -> IngestionPipeline {
        let embedder = Embedder::new(Arc::new(AnyProvider::Mock(mock)), 8).unwrap();
        let splitter = TextSplitter::new(SplitterConfig {
            chunk_size: 40,
            chunk_overlap: 10,
        });
        IngestionPipeline::new(splitter, embedder, store, "docs")
    }

    #[tokio::test]
    async fn ingest_text_builds_live_collection() {
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = pipeline_with(MockProvider::default(), store.clone());

        let text = "The capital of France is Paris. Berlin is the capital of Germany. \
                    Madrid is the capital of Spain.";
        let report = pipeline
            .ingest_bytes("capitals.txt", Some("text/plain"), text.as_bytes().to_vec())
            .await
            .unwrap();

        assert_eq!(report.source, "capitals.txt");
        assert_eq!(report.pages, 1);
        assert_eq!(report.collection, "docs");
        assert_eq!(report.dimension, docqa_llm::mock::DEFAULT_DIMENSION);
        assert!(report.chunks > 1);
        assert_eq!(store.count("docs").await.unwrap(), report.chunks);
        assert!(!store.collection_exists("docs__staging").await.unwrap());
    }

    #[tokio::test]
    async fn reingest_replaces_previous_document() {
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = pipeline_with(MockProvider::default(), store.clone());

        pipeline
            .ingest_bytes("a.txt", None, b"Alpha document about apples.".to_vec())
            .await
            .unwrap();
        pipeline
            .ingest_bytes("b.txt", None, b"Beta document about bananas.".to_vec())
            .await
            .unwrap();

        let vector = vec![1.0; docqa_llm::mock::DEFAULT_DIMENSION];
        let hits = store.search("docs", vector, 10).await.unwrap();
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|h| h.metadata["source"] == "b.txt"));
    }

    #[tokio::test]
    async fn unsupported_format_leaves_index_untouched() {
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = pipeline_with(MockProvider::default(), store.clone());
        pipeline
            .ingest_bytes("a.txt", None, b"Existing content.".to_vec())
            .await
            .unwrap();

        let err = pipeline
            .ingest_bytes("image.png", Some("image/png"), vec![0x89, b'P', b'N', b'G'])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RagError::Document(DocumentError::UnsupportedFormat(_))
        ));
        assert!(err.is_client_error());
        assert_eq!(store.count("docs").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn blank_document_is_empty_document() {
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = pipeline_with(MockProvider::default(), store.clone());

        let err = pipeline
            .ingest_bytes("blank.txt", None, b"   \n\n\t ".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RagError::Document(DocumentError::EmptyDocument(_))
        ));
        assert!(!store.collection_exists("docs").await.unwrap());
    }

    #[tokio::test]
    async fn oversized_upload_rejected() {
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = pipeline_with(MockProvider::default(), store).with_max_file_size(4);

        let err = pipeline
            .ingest_bytes("a.txt", None, b"too long".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RagError::Document(DocumentError::FileTooLarge(8))
        ));
    }

    #[tokio::test]
    async fn embedding_failure_keeps_previous_index() {
        let store: Arc<InMemoryVectorStore> = Arc::new(InMemoryVectorStore::new());
        pipeline_with(MockProvider::default(), store.clone())
            .ingest_bytes("a.txt", None, b"Earlier content stays.".to_vec())
            .await
            .unwrap();

        let err = pipeline_with(MockProvider::default().with_failing_embed(), store.clone())
            .ingest_bytes("b.txt", None, b"Replacement content.".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::ProviderUnavailable(_)));

        let vector = vec![1.0; docqa_llm::mock::DEFAULT_DIMENSION];
        let hits = store.search("docs", vector, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata["source"], "a.txt");
    }

    const APPLES: &str = "Alpha document about apples. Apples grow on trees in orchards. \
                          Green apples are sour. Red apples are sweet.";
    const BANANAS: &str = "Beta document about bananas. Bananas grow in bunches. \
                           Ripe bananas turn yellow. Green bananas are starchy.";

    fn sources(hits: impl IntoIterator<Item = String>) -> std::collections::HashSet<String> {
        hits.into_iter().collect()
    }

    async fn chunk_count(text: &str) -> usize {
        let store = Arc::new(InMemoryVectorStore::new());
        pipeline_with(MockProvider::default(), store)
            .ingest_bytes("count.txt", None, text.as_bytes().to_vec())
            .await
            .unwrap()
            .chunks
    }

    /// Readers racing a stream of re-ingests see one whole document, never a
    /// partial, mixed, or missing index.
    async fn concurrent_reingest_keeps_reads_whole(store: Arc<dyn VectorStore>) {
        let mock = MockProvider::echo().with_delay(2);
        let provider = Arc::new(AnyProvider::Mock(mock.clone()));
        let pipeline = Arc::new(pipeline_with(mock, Arc::clone(&store)));
        let query = crate::query::QueryPipeline::new(
            Embedder::new(Arc::clone(&provider), 8).unwrap(),
            Arc::clone(&store),
            crate::synthesizer::AnswerSynthesizer::new(provider),
            "docs",
        )
        .with_top_k(50);

        let expected = std::collections::HashMap::from([
            ("a.txt".to_owned(), chunk_count(APPLES).await),
            ("b.txt".to_owned(), chunk_count(BANANAS).await),
        ]);
        assert!(expected.values().all(|&n| n > 1));

        pipeline
            .ingest_bytes("a.txt", None, APPLES.as_bytes().to_vec())
            .await
            .unwrap();

        let writers: Vec<_> = (0..10)
            .map(|i| {
                let pipeline = Arc::clone(&pipeline);
                let (name, text) = if i % 2 == 0 {
                    ("b.txt", BANANAS)
                } else {
                    ("a.txt", APPLES)
                };
                tokio::spawn(async move {
                    pipeline
                        .ingest_bytes(name, None, text.as_bytes().to_vec())
                        .await
                })
            })
            .collect();

        let vector = vec![1.0; docqa_llm::mock::DEFAULT_DIMENSION];
        let mut reads = 0;
        while reads < 20 || !writers.iter().all(tokio::task::JoinHandle::is_finished) {
            let hits = store.search("docs", vector.clone(), 100).await.unwrap();
            let seen = sources(hits.iter().map(|h| {
                h.metadata["source"].as_str().unwrap_or_default().to_owned()
            }));
            assert_eq!(seen.len(), 1, "mixed read: {seen:?}");
            let source = seen.into_iter().next().unwrap();
            assert_eq!(hits.len(), expected[&source], "partial read of {source}");

            let answer = query.ask("apples or bananas?").await.unwrap();
            assert!(!answer.sources.is_empty());
            let seen = sources(answer.sources.into_iter().map(|c| c.source));
            assert_eq!(seen.len(), 1, "mixed answer sources: {seen:?}");

            reads += 1;
            tokio::task::yield_now().await;
        }

        for writer in writers {
            writer.await.unwrap().unwrap();
        }
        assert!(!store.collection_exists("docs__staging").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reingest_in_memory() {
        concurrent_reingest_keeps_reads_whole(Arc::new(InMemoryVectorStore::new())).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reingest_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::sqlite::SqliteVectorStore::open(&dir.path().join("index"))
            .await
            .unwrap();
        concurrent_reingest_keeps_reads_whole(Arc::new(store)).await;
    }

    #[tokio::test]
    async fn ingest_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.md");
        std::fs::write(&file, "# Notes\n\nSome markdown content.").unwrap();

        let store = Arc::new(InMemoryVectorStore::new());
        let report = pipeline_with(MockProvider::default(), store)
            .ingest_path(&file)
            .await
            .unwrap();
        assert_eq!(report.source, "notes.md");
        assert!(report.chunks >= 1);
    }

    #[tokio::test]
    async fn entries_carry_metadata_and_stable_ids() {
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = pipeline_with(MockProvider::default(), store.clone());
        let text = b"Same bytes every time, split into a couple of chunks here.".to_vec();

        pipeline
            .ingest_bytes("same.txt", None, text.clone())
            .await
            .unwrap();
        let vector = vec![1.0; docqa_llm::mock::DEFAULT_DIMENSION];
        let mut first: Vec<String> = store
            .search("docs", vector.clone(), 50)
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.id)
            .collect();

        pipeline.ingest_bytes("same.txt", None, text).await.unwrap();
        let hits = store.search("docs", vector, 50).await.unwrap();
        let mut second: Vec<String> = hits.iter().map(|h| h.id.clone()).collect();

        first.sort();
        second.sort();
        assert_eq!(first, second);
        assert_eq!(hits[0].metadata["content_type"], "text/plain");
        assert!(hits[0].metadata.contains_key("chunk_index"));
        assert!(!hits[0].metadata.contains_key("page"));
    }

    #[test]
    fn state_display() {
        assert_eq!(IngestState::Received.to_string(), "received");
        assert_eq!(IngestState::Failed.to_string(), "failed");
    }

    #[test]
    fn entry_ids_differ_by_range_and_page() {
        let meta = crate::document::DocumentMetadata::new("a.pdf", "application/pdf");
        let chunk = |start, end| Chunk {
            content: "x".into(),
            metadata: meta.clone(),
            chunk_index: 0,
            start,
            end,
        };
        let a = index_entry("d", chunk(0, 5), vec![1.0]);
        let b = index_entry("d", chunk(5, 10), vec![1.0]);
        let mut paged = chunk(0, 5);
        paged.metadata.extra.insert("page".into(), "2".into());
        let c = index_entry("d", paged, vec![1.0]);
        assert_ne!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(c.metadata["page"], 2);
    }
}
