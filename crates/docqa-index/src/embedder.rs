use std::sync::Arc;

use docqa_llm::{AnyProvider, LlmError, LlmProvider};

use crate::error::RagError;

pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Shared handle to the embedding model. Ingestion and querying hold clones of
/// the same instance so documents and questions land in the same vector space.
#[derive(Debug, Clone)]
pub struct Embedder {
    provider: Arc<AnyProvider>,
    batch_size: usize,
}

impl Embedder {
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] if the provider has no embedding model.
    pub fn new(provider: Arc<AnyProvider>, batch_size: usize) -> Result<Self, RagError> {
        if !provider.supports_embeddings() {
            return Err(RagError::Configuration(format!(
                "provider {} has no embedding model configured",
                provider.name()
            )));
        }
        Ok(Self {
            provider,
            batch_size: batch_size.max(1),
        })
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<AnyProvider> {
        &self.provider
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// # Errors
    ///
    /// Returns [`RagError::ProviderUnavailable`] if the backend fails or returns an empty vector.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let vector = self.provider.embed(text).await?;
        if vector.is_empty() {
            return Err(LlmError::EmptyResponse {
                provider: self.provider.name().to_owned(),
            }
            .into());
        }
        Ok(vector)
    }

    /// Embed `texts` in input order, `batch_size` texts per request. All vectors
    /// share one non-zero dimension.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ProviderUnavailable`] if any batch fails, returns the
    /// wrong number of vectors, or vectors of differing dimensions.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embedded = self.provider.embed_batch(batch).await?;
            if embedded.len() != batch.len() {
                return Err(LlmError::EmbeddingCount {
                    provider: self.provider.name().to_owned(),
                    expected: batch.len(),
                    actual: embedded.len(),
                }
                .into());
            }
            vectors.extend(embedded);
        }

        if let Some(first) = vectors.first() {
            let dim = first.len();
            if dim == 0 || vectors.iter().any(|v| v.len() != dim) {
                return Err(LlmError::Other(format!(
                    "{} returned embeddings of inconsistent dimensions",
                    self.provider.name()
                ))
                .into());
            }
        }
        tracing::debug!(texts = texts.len(), batch_size = self.batch_size, "embedded batch");
        Ok(vectors)
    }
}
