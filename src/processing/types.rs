//! Error definitions for the ingestion pipeline.

use crate::{
    embedding::EmbeddingClientError, extract::ExtractError, store::StoreError, tasks::TaskError,
};
use thiserror::Error;

/// Errors produced while turning extracted text into sentence windows.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Extraction produced no sentence worth indexing.
    #[error("no text could be extracted from the document")]
    EmptyDocument,
}

/// Failures of the background ingestion stages. Each one ends the task as `failed`.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Text extraction failed.
    #[error("Failed to extract text: {0}")]
    Extract(#[from] ExtractError),
    /// The document held no sentences.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed or returned malformed vectors.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Collection could not be created or filled.
    #[error("Failed to store chunks: {0}")]
    Store(#[from] StoreError),
}

/// Failures raised synchronously by an upload, before any background work is scheduled.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Uploaded bytes could not be written to the upload directory.
    #[error("failed to persist upload to {path}: {source}")]
    Io {
        /// Destination path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The generated task id collided with an existing task.
    #[error(transparent)]
    Task(#[from] TaskError),
}
