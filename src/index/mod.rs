// Vector index
// In-memory document store answering top-K cosine similarity queries by exhaustive scan


use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::embeddings::chunking::ChunkingConfig;
use crate::embeddings::{Embedder, EmbeddingError};

/// One embedded window of an ingested document. Never mutated after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentChunk {
    pub id: String,
    pub content: String,
    pub source: String,
    pub document_id: String,
    pub document_type: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub metadata: BTreeMap<String, String>,
    pub chunk_index: usize,
}

#[derive(Debug, Clone)]
pub struct SimilarityResult {
    pub chunk: Arc<DocumentChunk>,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestResult {
    pub document_id: String,
    pub chunks_created: usize,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Document content cannot be empty")]
    EmptyContent,

    #[error("Failed to embed document chunks: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Embedder returned {returned} vectors for {expected} chunks")]
    EmbeddingCount { expected: usize, returned: usize },
}

pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    chunks: RwLock<Vec<Arc<DocumentChunk>>>,
}

impl VectorIndex {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, chunking: ChunkingConfig) -> Self {
        Self {
            embedder,
            chunking,
            chunks: RwLock::new(Vec::new()),
        }
    }

    /// Chunk, embed and store a document.
    ///
    /// Every chunk is embedded before the index is touched, so a failed embedding stores
    /// nothing.
    #[inline]
    pub async fn ingest(
        &self,
        content: &str,
        document_type: &str,
        source: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<IngestResult, IndexError> {
        if content.trim().is_empty() {
            return Err(IndexError::EmptyContent);
        }

        let texts = self.chunking.chunk(content);
        debug!("Embedding {} chunks from {}", texts.len(), source);

        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != texts.len() {
            return Err(IndexError::EmbeddingCount {
                expected: texts.len(),
                returned: embeddings.len(),
            });
        }

        let document_id = Uuid::new_v4().to_string();
        let records: Vec<Arc<DocumentChunk>> = texts
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(chunk_index, (content, embedding))| {
                Arc::new(DocumentChunk {
                    id: format!("{document_id}_chunk_{chunk_index}"),
                    content,
                    source: source.to_string(),
                    document_id: document_id.clone(),
                    document_type: document_type.to_string(),
                    embedding,
                    metadata: metadata.clone(),
                    chunk_index,
                })
            })
            .collect();

        let chunks_created = records.len();
        self.chunks.write().await.extend(records);

        info!(
            "Ingested document {} from {} ({} chunks)",
            document_id, source, chunks_created
        );

        Ok(IngestResult {
            document_id,
            chunks_created,
        })
    }

    /// Top `limit` chunks scoring at least `threshold`, best first.
    ///
    /// Ties keep insertion order. The scan is linear in the number of stored chunks.
    #[inline]
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SimilarityResult>, IndexError> {
        let query_embedding = self.embedder.embed(query).await?;

        let mut results: Vec<SimilarityResult> = {
            let chunks = self.chunks.read().await;
            chunks
                .iter()
                .filter_map(|chunk| {
                    cosine_similarity(&query_embedding, &chunk.embedding)
                        .filter(|score| *score >= threshold)
                        .map(|score| SimilarityResult {
                            chunk: Arc::clone(chunk),
                            score,
                        })
                })
                .collect()
        };

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(limit);

        debug!(
            "Query matched {} chunks (limit {}, threshold {})",
            results.len(),
            limit,
            threshold
        );
        Ok(results)
    }

    /// Like [`search`](Self::search), but an embedding failure yields no results.
    #[inline]
    pub async fn query(&self, query: &str, limit: usize, threshold: f32) -> Vec<SimilarityResult> {
        match self.search(query, limit, threshold).await {
            Ok(results) => results,
            Err(e) => {
                warn!("Similarity query failed, returning no results: {}", e);
                Vec::new()
            }
        }
    }

    /// Number of stored chunks
    #[inline]
    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    #[inline]
    pub async fn is_empty(&self) -> bool {
        self.chunks.read().await.is_empty()
    }

    #[inline]
    pub async fn document_count(&self) -> usize {
        let chunks = self.chunks.read().await;
        chunks
            .iter()
            .map(|chunk| chunk.document_id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Cosine similarity clamped to `[-1, 1]`.
///
/// `None` when the vectors differ in length or are empty; `Some(0.0)` when either has zero
/// magnitude.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let (dot, norm_a, norm_b) = a.iter().zip(b).fold(
        (0.0_f32, 0.0_f32, 0.0_f32),
        |(dot, norm_a, norm_b), (x, y)| (x.mul_add(*y, dot), x.mul_add(*x, norm_a), y.mul_add(*y, norm_b)),
    );

    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(0.0);
    }

    let score = dot / (norm_a.sqrt() * norm_b.sqrt());
    score.is_finite().then(|| score.clamp(-1.0, 1.0))
}
