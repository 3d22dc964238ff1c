//! Per-document collection storage.
//!
//! Each successfully ingested document owns exactly one collection, named
//! `doc_{task_id}`. Collections are append-only: created once, filled once, and queried
//! read-only afterwards. Two backends implement [`CollectionStore`]: the durable Qdrant
//! client in [`crate::qdrant`] and [`memory::InMemoryStore`].

pub mod memory;

use crate::qdrant::QdrantError;
use async_trait::async_trait;
use std::cmp::Ordering;
use thiserror::Error;

pub use memory::InMemoryStore;

/// Prefix shared by every document collection.
pub const COLLECTION_PREFIX: &str = "doc_";

/// Collection identifier for the document ingested under `task_id`.
pub fn collection_id(task_id: &str) -> String {
    format!("{COLLECTION_PREFIX}{task_id}")
}

/// Errors raised by collection backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A collection with this id already exists.
    #[error("collection '{0}' already exists")]
    DuplicateCollection(String),
    /// No collection with this id exists.
    #[error("collection '{0}' does not exist")]
    UnknownCollection(String),
    /// The storage engine could not be reached or rejected the request.
    #[error("vector store unavailable: {0}")]
    Unavailable(#[from] QdrantError),
    /// A stored record lacked a required field.
    #[error("incomplete chunk record in '{collection}': missing {field}")]
    IncompleteRecord {
        /// Collection holding the record.
        collection: String,
        /// Name of the missing or mistyped field.
        field: &'static str,
    },
}

/// Chunk and vector handed to [`CollectionStore::add`].
#[derive(Debug, Clone)]
pub struct StoredChunk {
    /// Insertion position within the document; breaks score ties.
    pub ordinal: usize,
    /// Center sentence.
    pub text: String,
    /// Sentence plus surrounding context.
    pub window_text: String,
    /// Originating file path.
    pub source_path: String,
    /// Embedding of `text`.
    pub vector: Vec<f32>,
}

/// Chunk returned by [`CollectionStore::query`], annotated with its similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// Insertion position within the document.
    pub ordinal: usize,
    /// Center sentence.
    pub text: String,
    /// Sentence plus surrounding context.
    pub window_text: String,
    /// Originating file path.
    pub source_path: String,
    /// Similarity to the query vector, in `[0, 1]`.
    pub score: f32,
}

/// Storage contract for per-document collections.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Create an empty collection; fails with [`StoreError::DuplicateCollection`] if it exists.
    async fn create(&self, id: &str) -> Result<(), StoreError>;

    /// Bulk insert chunks into an existing collection, returning the number stored.
    async fn add(&self, id: &str, chunks: Vec<StoredChunk>) -> Result<usize, StoreError>;

    /// Return up to `k` chunks ranked by similarity to `vector`, ties in insertion order.
    async fn query(&self, id: &str, vector: &[f32], k: usize)
    -> Result<Vec<ScoredChunk>, StoreError>;

    /// Enumerate document collection ids in ascending lexicographic order.
    async fn list_all(&self) -> Result<Vec<String>, StoreError>;

    /// Drop a collection. Only used to undo a half-finished ingestion.
    async fn remove(&self, id: &str) -> Result<(), StoreError>;
}

/// Clamp raw similarities into `[0, 1]`, order them, and keep the best `k`.
///
/// Ordering is by descending score; equal scores keep insertion order (`ordinal`).
pub fn rank_chunks(mut chunks: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    for chunk in &mut chunks {
        chunk.score = if chunk.score.is_nan() {
            0.0
        } else {
            chunk.score.clamp(0.0, 1.0)
        };
    }
    chunks.sort_by(|left, right| {
        right
            .score
            .partial_cmp(&left.score)
            .unwrap_or(Ordering::Equal)
            .then(left.ordinal.cmp(&right.ordinal))
    });
    chunks.truncate(k);
    chunks
}

/// Cosine similarity between two vectors; `0.0` for empty or mismatched inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(ordinal: usize, score: f32) -> ScoredChunk {
        ScoredChunk {
            ordinal,
            text: format!("chunk {ordinal}"),
            window_text: String::new(),
            source_path: "doc.txt".into(),
            score,
        }
    }

    #[test]
    fn ranking_is_stable_on_ties_and_clamped() {
        let ranked = rank_chunks(
            vec![
                scored(3, 0.5),
                scored(1, 0.5),
                scored(2, 1.2),
                scored(0, -0.3),
                scored(4, f32::NAN),
            ],
            3,
        );
        let order: Vec<_> = ranked.iter().map(|chunk| chunk.ordinal).collect();
        assert_eq!(order, vec![2, 1, 3]);
        assert_eq!(ranked[0].score, 1.0);
    }

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn collection_ids_carry_prefix() {
        assert_eq!(collection_id("abc"), "doc_abc");
    }
}
