use std::sync::Arc;

use serde::Serialize;

use crate::embedder::Embedder;
use crate::error::RagError;
use crate::synthesizer::AnswerSynthesizer;
use crate::vector_store::{ScoredEntry, VectorStore, VectorStoreError};

pub const DEFAULT_TOP_K: usize = 3;

/// A retrieved chunk as shown to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceChunk {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub chunk_index: usize,
    pub score: f32,
    pub text: String,
}

impl From<ScoredEntry> for SourceChunk {
    fn from(entry: ScoredEntry) -> Self {
        let source = entry
            .metadata
            .get("source")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_owned();
        let page = entry
            .metadata
            .get("page")
            .and_then(serde_json::Value::as_u64)
            .and_then(|p| u32::try_from(p).ok());
        let chunk_index = entry
            .metadata
            .get("chunk_index")
            .and_then(serde_json::Value::as_u64)
            .and_then(|i| usize::try_from(i).ok())
            .unwrap_or_default();
        Self {
            source,
            page,
            chunk_index,
            score: entry.score,
            text: entry.text,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SourceChunk>,
}

/// Embed the question, retrieve the nearest chunks, synthesize an answer.
pub struct QueryPipeline {
    embedder: Embedder,
    store: Arc<dyn VectorStore>,
    synthesizer: AnswerSynthesizer,
    collection: String,
    top_k: usize,
}

impl QueryPipeline {
    pub fn new(
        embedder: Embedder,
        store: Arc<dyn VectorStore>,
        synthesizer: AnswerSynthesizer,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            store,
            synthesizer,
            collection: collection.into(),
            top_k: DEFAULT_TOP_K,
        }
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    #[must_use]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Nearest chunks for `question`, most similar first.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyQuery`] for a blank question,
    /// [`RagError::NoIndexAvailable`] before anything was ingested, and
    /// [`RagError::ProviderUnavailable`] if the question cannot be embedded.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<SourceChunk>, RagError> {
        if question.trim().is_empty() {
            return Err(RagError::EmptyQuery);
        }
        if !self.store.collection_exists(&self.collection).await? {
            return Err(RagError::NoIndexAvailable);
        }

        let vector = self.embedder.embed(question).await?;
        let hits = match self.store.search(&self.collection, vector, self.top_k).await {
            Ok(hits) => hits,
            Err(VectorStoreError::NotFound(_)) => return Err(RagError::NoIndexAvailable),
            Err(e) => return Err(e.into()),
        };
        Ok(hits.into_iter().map(SourceChunk::from).collect())
    }

    /// # Errors
    ///
    /// See [`QueryPipeline::retrieve`]; also fails if the chat model call fails.
    pub async fn ask(&self, question: &str) -> Result<Answer, RagError> {
        let sources = self.retrieve(question).await?;
        tracing::debug!(retrieved = sources.len(), "retrieved context");

        let contexts: Vec<&str> = sources.iter().map(|s| s.text.as_str()).collect();
        let text = self.synthesizer.synthesize(question, &contexts).await?;
        Ok(Answer { text, sources })
    }
}
