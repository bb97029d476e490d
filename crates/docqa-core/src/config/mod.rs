mod env;
mod types;


pub use types::*;

use std::path::{Path, PathBuf};

use anyhow::Context;

/// Problems in an otherwise well-formed configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("splitter.chunk_size must be greater than zero")]
    ZeroChunkSize,

    #[error("splitter.chunk_overlap ({overlap}) must be smaller than chunk_size ({size})")]
    OverlapTooLarge { overlap: usize, size: usize },

    #[error("index.top_k must be greater than zero")]
    ZeroTopK,

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("OpenAI API key missing: set DOCQA_OPENAI_API_KEY or OPENAI_API_KEY")]
    MissingApiKey,
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist. Secrets are read
    /// from the environment only.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.resolve_secrets();
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.splitter.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.splitter.chunk_overlap >= self.splitter.chunk_size {
            return Err(ConfigError::OverlapTooLarge {
                overlap: self.splitter.chunk_overlap,
                size: self.splitter.chunk_size,
            });
        }
        if self.index.top_k == 0 {
            return Err(ConfigError::ZeroTopK);
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Empty("llm.model"));
        }
        if self.llm.embedding_model.trim().is_empty() {
            return Err(ConfigError::Empty("llm.embedding_model"));
        }
        if self.index.collection.trim().is_empty() {
            return Err(ConfigError::Empty("index.collection"));
        }
        if self.llm.provider == ProviderKind::OpenAi && self.secrets.openai_api_key.is_none() {
            return Err(ConfigError::MissingApiKey);
        }
        Ok(())
    }
}

/// Priority: `--config` flag > `DOCQA_CONFIG` env > `config/default.toml`.
#[must_use]
pub fn resolve_config_path(cli: Option<PathBuf>) -> PathBuf {
    if let Some(path) = cli {
        return path;
    }
    if let Ok(path) = std::env::var("DOCQA_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}
