//! OpenAI-compatible embedding service.
//!
//! Uses the embeddings endpoint of OpenAI or any compatible provider
//! (e.g. `text-embedding-3-small`, 1536 dimensions).

use async_openai::{types::CreateEmbeddingRequestArgs, Client};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::EmbeddingService;

/// Timeout for a single embed request.
const EMBED_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for a batch request (larger payload).
const EMBED_BATCH_TIMEOUT: Duration = Duration::from_secs(60);

/// OpenAI embedding service implementation. Holds the async-openai client and model name.
#[derive(Debug, Clone)]
pub struct OpenAIEmbedding {
    client: Client<async_openai::config::OpenAIConfig>,
    model: String,
}

impl OpenAIEmbedding {
    /// Creates a new embedding service for the default OpenAI endpoint.
    pub fn new(api_key: String, model: String) -> Self {
        Self::new_with_base_url(api_key, model, None)
    }

    /// Creates a new embedding service with an optional base URL for
    /// OpenAI-compatible endpoints.
    pub fn new_with_base_url(api_key: String, model: String, base_url: Option<&str>) -> Self {
        let api_key = if api_key.is_empty() {
            std::env::var("OPENAI_API_KEY").unwrap_or_default()
        } else {
            api_key
        };

        let mut openai_config = async_openai::config::OpenAIConfig::new().with_api_key(api_key);
        if let Some(url) = base_url.filter(|s| !s.is_empty()) {
            openai_config = openai_config.with_api_base(url);
        }
        let client = Client::with_config(openai_config);

        Self { client, model }
    }

    /// Sets a different embedding model.
    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    /// Returns the embedding model name (for tests and diagnostics).
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl EmbeddingService for OpenAIEmbedding {
    #[instrument(skip(self, text), fields(model = %self.model, text_len = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, anyhow::Error> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(self.model.clone())
            .input(vec![text])
            .build()?;

        let embeddings = self.client.embeddings();
        let create_future = embeddings.create(request);
        let response = match tokio::time::timeout(EMBED_TIMEOUT, create_future).await {
            Ok(Ok(r)) => {
                debug!("embed response received");
                r
            }
            Ok(Err(e)) => {
                warn!(error = %e, "embed request failed");
                return Err(e.into());
            }
            Err(_) => {
                warn!(timeout_secs = EMBED_TIMEOUT.as_secs(), "embed request timed out");
                return Err(anyhow::anyhow!(
                    "embed request timed out after {} seconds",
                    EMBED_TIMEOUT.as_secs()
                ));
            }
        };

        let embedding = match response.data.first() {
            Some(item) => item.embedding.clone(),
            None => {
                warn!("embed response has no embedding data");
                return Err(anyhow::anyhow!("No embedding in response"));
            }
        };

        info!(dimension = embedding.len(), "embed done");
        Ok(embedding)
    }

    #[instrument(skip(self, texts), fields(model = %self.model, batch_size = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, anyhow::Error> {
        if texts.is_empty() {
            debug!("embed_batch empty input, skipping");
            return Ok(vec![]);
        }

        let inputs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();

        let request = CreateEmbeddingRequestArgs::default()
            .model(self.model.clone())
            .input(inputs)
            .build()?;

        let embeddings = self.client.embeddings();
        let create_future = embeddings.create(request);
        let response = match tokio::time::timeout(EMBED_BATCH_TIMEOUT, create_future).await {
            Ok(Ok(r)) => r,
            Ok(Err(e)) => {
                warn!(error = %e, "embed_batch request failed");
                return Err(e.into());
            }
            Err(_) => {
                warn!(
                    timeout_secs = EMBED_BATCH_TIMEOUT.as_secs(),
                    "embed_batch request timed out"
                );
                return Err(anyhow::anyhow!(
                    "embed_batch request timed out after {} seconds",
                    EMBED_BATCH_TIMEOUT.as_secs()
                ));
            }
        };

        let embeddings: Vec<Vec<f32>> = response
            .data
            .into_iter()
            .map(|item| item.embedding)
            .collect();

        if embeddings.len() != texts.len() {
            warn!(
                expected = texts.len(),
                got = embeddings.len(),
                "embed_batch response count mismatch"
            );
            return Err(anyhow::anyhow!(
                "Expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            ));
        }

        info!(count = embeddings.len(), "embed_batch done");
        Ok(embeddings)
    }
}
