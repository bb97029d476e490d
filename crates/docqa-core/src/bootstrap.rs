//! Application bootstrap: provider, index store, and pipeline construction.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use docqa_index::document::{SplitterConfig, TextSplitter};
use docqa_index::{
    AnswerSynthesizer, Embedder, IngestionPipeline, QueryPipeline, SqliteVectorStore, VectorStore,
};
use docqa_llm::AnyProvider;
use docqa_llm::ollama::OllamaProvider;
use docqa_llm::openai::OpenAiProvider;

use crate::config::{Config, ProviderKind};

/// Everything a front end (HTTP or CLI) needs to ingest and query.
pub struct App {
    pub config: Config,
    pub provider: Arc<AnyProvider>,
    pub ingest: Arc<IngestionPipeline>,
    pub query: Arc<QueryPipeline>,
}

impl App {
    /// Build the provider named in `config` and wire the pipelines around it.
    ///
    /// # Errors
    ///
    /// Fails if the provider cannot be constructed or the index cannot be opened.
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let provider = create_provider(&config)?;
        Self::with_provider(config, provider).await
    }

    /// # Errors
    ///
    /// Fails if the provider cannot embed or the index cannot be opened.
    pub async fn with_provider(config: Config, provider: AnyProvider) -> anyhow::Result<Self> {
        let provider = Arc::new(provider);
        // One embedder shared by both pipelines keeps ingestion and query vectors comparable.
        let embedder = Embedder::new(Arc::clone(&provider), config.llm.embed_batch_size)
            .context("embedding model not configured")?;

        let store = SqliteVectorStore::open(Path::new(&config.index.path))
            .await
            .with_context(|| format!("failed to open index at {}", config.index.path))?;
        tracing::info!(path = %store.path().display(), "vector index opened");
        let store: Arc<dyn VectorStore> = Arc::new(store);

        let splitter = TextSplitter::new(SplitterConfig {
            chunk_size: config.splitter.chunk_size,
            chunk_overlap: config.splitter.chunk_overlap,
        });
        let ingest = IngestionPipeline::new(
            splitter,
            embedder.clone(),
            Arc::clone(&store),
            config.index.collection.clone(),
        )
        .with_max_file_size(config.splitter.max_file_size);

        let query = QueryPipeline::new(
            embedder,
            store,
            AnswerSynthesizer::new(Arc::clone(&provider)),
            config.index.collection.clone(),
        )
        .with_top_k(config.index.top_k);

        Ok(Self {
            config,
            provider,
            ingest: Arc::new(ingest),
            query: Arc::new(query),
        })
    }
}

/// # Errors
///
/// Fails if the `OpenAI` key is missing or the HTTP client cannot be built.
pub fn create_provider(config: &Config) -> anyhow::Result<AnyProvider> {
    let llm = &config.llm;
    match llm.provider {
        ProviderKind::Ollama => Ok(AnyProvider::Ollama(OllamaProvider::new(
            llm.effective_base_url(),
            llm.model.clone(),
            llm.embedding_model.clone(),
        ))),
        ProviderKind::OpenAi => {
            let api_key = config
                .secrets
                .openai_api_key
                .as_ref()
                .context("DOCQA_OPENAI_API_KEY (or OPENAI_API_KEY) not set")?
                .expose()
                .to_owned();
            let provider = OpenAiProvider::new(
                api_key,
                llm.effective_base_url().to_owned(),
                llm.model.clone(),
                llm.max_tokens,
                Some(llm.embedding_model.clone()),
            )
            .context("failed to build OpenAI client")?;
            Ok(AnyProvider::OpenAi(provider))
        }
    }
}

/// Log whether the configured backend is reachable. Never fails startup.
pub async fn health_check(provider: &AnyProvider) {
    if let AnyProvider::Ollama(ollama) = provider {
        match ollama.health_check().await {
            Ok(()) => tracing::info!("ollama health check passed"),
            Err(e) => tracing::warn!("ollama health check failed: {e:#}"),
        }
    }
}
