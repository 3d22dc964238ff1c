//! Ingestion pipeline: persist the upload, then extract, window, embed, store, and summarize it
//! in the background.
//!
//! [`IngestionPipeline::ingest`] does only the synchronous part (writing the bytes and registering
//! the task) and hands the rest to a spawned tokio task. Callers learn the outcome by polling the
//! [`TaskRegistry`]. Every stage error becomes a `failed` task; none escapes to the caller.

use super::{
    chunking::{ChunkWindower, WindowedChunk},
    types::{IngestError, PipelineError},
};
use crate::{
    config::Config,
    embedding::{EmbeddingClient, EmbeddingClientError},
    extract::extract_file,
    generation::LanguageModel,
    metrics::ServiceMetrics,
    store::{CollectionStore, StoredChunk, collection_id},
    tasks::{TaskRegistry, TaskState},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Summary recorded when the generative collaborator cannot produce one.
pub const SUMMARY_FALLBACK: &str = "Summary generation failed. The document has been processed successfully but no summary is available.";

const SUMMARY_SENTENCES: usize = 5;

/// Tunables for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Directory receiving uploaded bytes.
    pub upload_dir: PathBuf,
    /// Sentences kept on each side of a chunk.
    pub window_size: usize,
    /// Leading characters of the document forwarded for summarization.
    pub summary_input_chars: usize,
    /// Chunks per embedding request.
    pub embedding_batch_size: usize,
}

impl PipelineSettings {
    /// Derive settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            upload_dir: config.upload_dir.clone(),
            window_size: config.sentence_window_size,
            summary_input_chars: config.summary_input_chars,
            embedding_batch_size: config.embedding_batch_size,
        }
    }
}

/// Orchestrates document ingestion. Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct IngestionPipeline {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn CollectionStore>,
    llm: Arc<dyn LanguageModel>,
    registry: Arc<TaskRegistry>,
    metrics: Arc<ServiceMetrics>,
    settings: PipelineSettings,
}

impl IngestionPipeline {
    /// Assemble a pipeline from its collaborators.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn CollectionStore>,
        llm: Arc<dyn LanguageModel>,
        registry: Arc<TaskRegistry>,
        metrics: Arc<ServiceMetrics>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            embedder,
            store,
            llm,
            registry,
            metrics,
            settings,
        }
    }

    /// Registry this pipeline reports into.
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Persist `bytes`, register a task, and schedule processing. Returns the task id at once.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn ingest(&self, bytes: &[u8], filename: &str) -> Result<String, IngestError> {
        let task_id = Uuid::new_v4().to_string();
        let path = self
            .settings
            .upload_dir
            .join(format!("{task_id}_{}", stored_file_name(filename)));

        let io_error = |source| IngestError::Io {
            path: path.display().to_string(),
            source,
        };
        tokio::fs::create_dir_all(&self.settings.upload_dir)
            .await
            .map_err(io_error)?;
        tokio::fs::write(&path, bytes).await.map_err(io_error)?;
        tracing::info!(task_id = %task_id, file = %path.display(), bytes = bytes.len(), "Upload saved");

        self.register(&task_id, filename, &path).await?;

        let pipeline = self.clone();
        let background_id = task_id.clone();
        tokio::spawn(async move { pipeline.supervise(background_id, path).await });

        Ok(task_id)
    }

    /// Register the task for a saved upload, deleting the file when registration is refused.
    async fn register(&self, task_id: &str, filename: &str, path: &Path) -> Result<(), IngestError> {
        if let Err(error) = self.registry.create(task_id, filename) {
            if let Err(cleanup) = tokio::fs::remove_file(path).await {
                tracing::warn!(file = %path.display(), error = %cleanup, "Failed to remove orphaned upload");
            }
            return Err(error.into());
        }
        Ok(())
    }

    /// Run [`Self::process`] on its own task so a panic still leaves the task `failed`.
    async fn supervise(self, task_id: String, path: PathBuf) {
        let worker = self.clone();
        let worker_id = task_id.clone();
        let handle = tokio::spawn(async move { worker.process(&worker_id, &path).await });

        if let Err(error) = handle.await {
            self.metrics.record_failure();
            tracing::error!(task_id = %task_id, error = %error, "Document processing aborted");
            self.registry.set_result(
                &task_id,
                TaskState::Failed {
                    error: format!("Document processing aborted: {error}"),
                },
            );
        }
    }

    /// Run every ingestion stage for a registered task and record the terminal state.
    pub async fn process(&self, task_id: &str, path: &Path) {
        let started = Instant::now();
        tracing::info!(task_id, file = %path.display(), "Document processing started");

        let state = match self.index_document(task_id, path).await {
            Ok((text, chunks)) => {
                let summary = self.summarize(task_id, &text).await;
                self.metrics.record_document(chunks as u64);
                tracing::info!(
                    task_id,
                    chunks,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Document processing completed"
                );
                TaskState::Completed { summary }
            }
            Err(error) => {
                self.metrics.record_failure();
                tracing::error!(
                    task_id,
                    error = %error,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Document processing failed"
                );
                TaskState::Failed {
                    error: error.to_string(),
                }
            }
        };

        self.registry.set_result(task_id, state);
    }

    /// Extract, window, embed, and store one document. Returns its text and chunk count.
    async fn index_document(
        &self,
        task_id: &str,
        path: &Path,
    ) -> Result<(String, usize), PipelineError> {
        let document = extract_file(path).await?;
        let windows: Vec<WindowedChunk> = ChunkWindower::new(self.settings.window_size)
            .window(&document)?
            .collect();
        tracing::debug!(task_id, chunks = windows.len(), "Document windowed");

        let chunks = self.embed_chunks(windows).await?;
        let count = chunks.len();

        let collection = collection_id(task_id);
        self.store.create(&collection).await?;
        if let Err(error) = self.store.add(&collection, chunks).await {
            if let Err(cleanup) = self.store.remove(&collection).await {
                tracing::warn!(collection = %collection, error = %cleanup, "Failed to remove partial collection");
            }
            return Err(error.into());
        }
        tracing::debug!(collection = %collection, chunks = count, "Chunks stored");

        Ok((document.text, count))
    }

    async fn embed_chunks(
        &self,
        windows: Vec<WindowedChunk>,
    ) -> Result<Vec<StoredChunk>, EmbeddingClientError> {
        let batch_size = self.settings.embedding_batch_size.max(1);
        let mut stored = Vec::with_capacity(windows.len());

        for batch in windows.chunks(batch_size) {
            let texts = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = self.embedder.generate_embeddings(texts).await?;
            if vectors.len() != batch.len() {
                return Err(EmbeddingClientError::InvalidResponse(format!(
                    "expected {} vectors, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            stored.extend(batch.iter().zip(vectors).map(|(chunk, vector)| StoredChunk {
                ordinal: chunk.ordinal,
                text: chunk.text.clone(),
                window_text: chunk.window_text.clone(),
                source_path: chunk.source_path.clone(),
                vector,
            }));
        }

        Ok(stored)
    }

    async fn summarize(&self, task_id: &str, text: &str) -> String {
        let excerpt = leading_chars(text, self.settings.summary_input_chars);
        match self.llm.summarize(excerpt, SUMMARY_SENTENCES).await {
            Ok(summary) => summary,
            Err(error) => {
                tracing::error!(task_id, error = %error, "Failed to generate summary");
                SUMMARY_FALLBACK.to_string()
            }
        }
    }
}

/// First `limit` characters of `text`, cut on a char boundary.
fn leading_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// File name component of an upload name, so it cannot escape the upload directory.
fn stored_file_name(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or("upload")
        .to_string()
}
