//! Embedding configuration: trait and env-based implementation.

use anyhow::Result;
use std::env;

/// Embedding service configuration interface.
pub trait EmbeddingConfig: Send + Sync {
    /// API key for the OpenAI-compatible embedding endpoint.
    fn api_key(&self) -> &str;
    /// Optional base URL; when set, embedding requests use this URL instead
    /// of the default OpenAI API.
    fn base_url(&self) -> Option<&str>;
    /// Embedding model name.
    fn model(&self) -> &str;
    /// Expected vector dimension (deployment-wide constant).
    fn dimension(&self) -> usize;
}

/// Embedding config loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvEmbeddingConfig {
    pub openai_api_key: String,
    pub openai_base_url: Option<String>,
    pub embedding_model: String,
    pub embedding_dimension: usize,
}

impl EmbeddingConfig for EnvEmbeddingConfig {
    fn api_key(&self) -> &str {
        &self.openai_api_key
    }
    fn base_url(&self) -> Option<&str> {
        self.openai_base_url.as_deref().filter(|s| !s.is_empty())
    }
    fn model(&self) -> &str {
        &self.embedding_model
    }
    fn dimension(&self) -> usize {
        self.embedding_dimension
    }
}

impl EnvEmbeddingConfig {
    /// Load from environment variables.
    pub fn from_env() -> Result<Self> {
        let openai_api_key = env::var("OPENAI_API_KEY").unwrap_or_default();
        let openai_base_url = env::var("OPENAI_BASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty());
        let embedding_model = env::var("EMBEDDING_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".to_string());
        let embedding_dimension = env::var("EMBEDDING_DIMENSION")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1536);
        Ok(Self {
            openai_api_key,
            openai_base_url,
            embedding_model,
            embedding_dimension,
        })
    }

    /// Validate config (embedding requires an API key).
    pub fn validate(&self) -> Result<()> {
        if self.openai_api_key.is_empty() {
            anyhow::bail!("Embedding requires OPENAI_API_KEY to be set");
        }
        Ok(())
    }
}
