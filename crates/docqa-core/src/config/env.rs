use std::str::FromStr;

use super::Config;
use crate::secret::Secret;

const OPENAI_KEY_VARS: [&str; 2] = ["DOCQA_OPENAI_API_KEY", "OPENAI_API_KEY"];

/// Parsed value of `key`, or `None` (with a warning) when it does not parse.
fn parsed<T: FromStr>(key: &str) -> Option<T> {
    let v = std::env::var(key).ok()?;
    match v.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("ignoring invalid {key} value: {v}");
            None
        }
    }
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DOCQA_LLM_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.to_lowercase())) {
                self.llm.provider = kind;
            } else {
                tracing::warn!("ignoring invalid DOCQA_LLM_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("DOCQA_LLM_BASE_URL") {
            self.llm.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("DOCQA_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("DOCQA_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("DOCQA_INDEX_PATH") {
            self.index.path = v;
        }
        if let Ok(v) = std::env::var("DOCQA_INDEX_COLLECTION") {
            self.index.collection = v;
        }
        if let Some(k) = parsed("DOCQA_RETRIEVAL_TOP_K") {
            self.index.top_k = k;
        }
        if let Some(n) = parsed("DOCQA_CHUNK_SIZE") {
            self.splitter.chunk_size = n;
        }
        if let Some(n) = parsed("DOCQA_CHUNK_OVERLAP") {
            self.splitter.chunk_overlap = n;
        }
        if let Ok(v) = std::env::var("DOCQA_SERVER_BIND") {
            self.server.bind = v;
        }
        if let Some(port) = parsed("DOCQA_SERVER_PORT") {
            self.server.port = port;
        }
        if let Ok(v) = std::env::var("DOCQA_CORS_ORIGINS") {
            self.server.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }

    pub(crate) fn resolve_secrets(&mut self) {
        self.secrets.openai_api_key = Secret::from_env(&OPENAI_KEY_VARS);
    }
}
