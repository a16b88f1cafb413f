//! # Document Store
//!
//! Content chunks plus their embedding vectors, with nearest-neighbor
//! retrieval by cosine similarity. Chunks are written by ingestion and
//! read-only in the hot path; they are identified by rank, not looked up by
//! ID.
//!
//! The SQLite implementation stores embeddings as little-endian f32 BLOBs and
//! computes similarity in memory over the candidate rows. Adequate at this
//! scale; a dedicated vector index would replace this for large corpora.

use async_trait::async_trait;
use embedding::EmbeddingService;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// A retrieved chunk: content plus its ingestion metadata.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub content: String,
    pub metadata: serde_json::Value,
}

/// Store of embedded document chunks with similarity search.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Embeds and inserts a chunk; returns its id.
    async fn add(
        &self,
        content: &str,
        metadata: serde_json::Value,
    ) -> Result<Uuid, anyhow::Error>;

    /// Embeds the query and returns the `k` nearest chunks, best first.
    async fn search(&self, query_text: &str, k: usize)
        -> Result<Vec<RetrievedChunk>, anyhow::Error>;

    /// Removes all chunks. Administrative reseeding only.
    async fn clear(&self) -> Result<(), anyhow::Error>;
}

/// SQLite-backed document store.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
    embedder: Arc<dyn EmbeddingService>,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool, embedder: Arc<dyn EmbeddingService>) -> Self {
        Self { pool, embedder }
    }

    fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
        embedding
            .iter()
            .flat_map(|f| f.to_le_bytes().to_vec())
            .collect()
    }

    fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    /// Calculates cosine similarity between two vectors.
    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot_product / (norm_a * norm_b)
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    #[instrument(skip(self, content, metadata), fields(content_len = content.len()))]
    async fn add(
        &self,
        content: &str,
        metadata: serde_json::Value,
    ) -> Result<Uuid, anyhow::Error> {
        let embedding = self.embedder.embed(content).await?;
        let id = Uuid::new_v4();

        sqlx::query(
            "INSERT INTO documents (id, content, metadata, embedding) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(id.to_string())
        .bind(content)
        .bind(metadata.to_string())
        .bind(Self::embedding_to_blob(&embedding))
        .execute(&self.pool)
        .await?;

        debug!(id = %id, dimension = embedding.len(), "document chunk added");
        Ok(id)
    }

    #[instrument(skip(self, query_text), fields(query_len = query_text.len()))]
    async fn search(
        &self,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, anyhow::Error> {
        let query_embedding = self.embedder.embed(query_text).await?;

        let rows = sqlx::query("SELECT content, metadata, embedding FROM documents")
            .fetch_all(&self.pool)
            .await?;

        let mut similarities: Vec<(f32, RetrievedChunk)> = Vec::new();
        for row in rows {
            let content: String = row.try_get("content")?;
            let metadata: Option<String> = row.try_get("metadata")?;
            let blob: Vec<u8> = row.try_get("embedding")?;

            let embedding = Self::blob_to_embedding(&blob);
            let similarity = Self::cosine_similarity(&query_embedding, &embedding);

            let metadata = metadata
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or(serde_json::Value::Null);

            similarities.push((similarity, RetrievedChunk { content, metadata }));
        }

        similarities.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let results: Vec<RetrievedChunk> = similarities
            .into_iter()
            .take(k)
            .map(|(_, chunk)| chunk)
            .collect();

        info!(retrieved = results.len(), "document search done");
        Ok(results)
    }

    async fn clear(&self) -> Result<(), anyhow::Error> {
        sqlx::query("DELETE FROM documents")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
