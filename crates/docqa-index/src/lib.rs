//! Document chunking, the persistent vector index, and the ingestion and query
//! pipelines that tie them to the model providers.

pub mod document;
pub mod embedder;
pub mod error;
pub mod in_memory_store;
pub mod pipeline;
pub mod query;
pub mod sqlite;
pub mod synthesizer;
pub mod vector_store;

pub use embedder::Embedder;
pub use error::RagError;
pub use in_memory_store::InMemoryVectorStore;
pub use pipeline::{IngestReport, IngestState, IngestionPipeline};
pub use query::{Answer, QueryPipeline, SourceChunk};
pub use sqlite::SqliteVectorStore;
pub use synthesizer::AnswerSynthesizer;
pub use vector_store::{IndexEntry, ScoredEntry, VectorStore, VectorStoreError};
