use docqa_llm::LlmError;

use crate::document::DocumentError;
use crate::vector_store::VectorStoreError;

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("model provider unavailable: {0}")]
    ProviderUnavailable(#[from] LlmError),

    #[error("no document index found")]
    NoIndexAvailable,

    #[error("query must not be empty")]
    EmptyQuery,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("vector index error: {0}")]
    VectorStore(#[from] VectorStoreError),
}

impl RagError {
    /// Errors caused by the request rather than by the service.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Document(e) => e.is_client_error(),
            Self::NoIndexAvailable | Self::EmptyQuery => true,
            Self::ProviderUnavailable(_) | Self::Configuration(_) | Self::VectorStore(_) => false,
        }
    }
}
