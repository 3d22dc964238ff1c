//! Service facade shared by the HTTP surface: ingestion, task polling, and question answering.
//!
//! The service owns long-lived handles to the collaborators, the collection store, the task
//! registry, and the metrics counters. Construct it once near process start and share it through
//! an `Arc`.

use crate::{
    config::{Config, VectorStoreKind},
    embedding::{EmbeddingClient, EmbeddingClientError, get_embedding_client},
    generation::{GenerationError, LanguageModel, get_language_model},
    metrics::{MetricsSnapshot, ServiceMetrics},
    processing::{IngestError, IngestionPipeline, PipelineSettings},
    qdrant::{QdrantError, QdrantService},
    retrieval::{AnswerResponse, RetrievalRanker},
    store::{CollectionStore, InMemoryStore},
    tasks::{TaskRegistry, TaskSnapshot},
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while wiring the service from configuration.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Embedding client could not be built.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Generation client could not be built.
    #[error(transparent)]
    Generation(#[from] GenerationError),
    /// Qdrant client could not be built.
    #[error(transparent)]
    Qdrant(#[from] QdrantError),
}

/// Operations exposed to external surfaces.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// Persist an upload and schedule its ingestion, returning the task id.
    async fn upload(&self, bytes: Vec<u8>, filename: String) -> Result<String, IngestError>;

    /// Current state of a task.
    fn task_status(&self, task_id: &str) -> TaskSnapshot;

    /// Answer a question from the most relevant document.
    async fn ask(&self, question: &str) -> AnswerResponse;

    /// Counters for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Production implementation of [`DocumentApi`].
pub struct DocumentService {
    pipeline: IngestionPipeline,
    ranker: RetrievalRanker,
    metrics: Arc<ServiceMetrics>,
}

impl DocumentService {
    /// Assemble a service from explicit collaborators.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn CollectionStore>,
        llm: Arc<dyn LanguageModel>,
        settings: PipelineSettings,
        top_k: usize,
    ) -> Self {
        let metrics = Arc::new(ServiceMetrics::new());
        let pipeline = IngestionPipeline::new(
            Arc::clone(&embedder),
            Arc::clone(&store),
            Arc::clone(&llm),
            Arc::new(TaskRegistry::new()),
            Arc::clone(&metrics),
            settings,
        );
        let ranker = RetrievalRanker::new(embedder, store, llm, Arc::clone(&metrics), top_k);
        Self {
            pipeline,
            ranker,
            metrics,
        }
    }

    /// Build every collaborator from configuration.
    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        tracing::info!("Initializing embedding client");
        let embedder: Arc<dyn EmbeddingClient> = Arc::from(get_embedding_client(config)?);
        let llm: Arc<dyn LanguageModel> = Arc::from(get_language_model(config)?);
        let store: Arc<dyn CollectionStore> = match config.vector_store {
            VectorStoreKind::Qdrant => Arc::new(QdrantService::new(
                &config.qdrant_url,
                config.qdrant_api_key.clone(),
                config.embedding_dimension as u64,
            )?),
            VectorStoreKind::Memory => Arc::new(InMemoryStore::new()),
        };
        tracing::info!(store = ?config.vector_store, "Collaborators initialized");

        Ok(Self::new(
            embedder,
            store,
            llm,
            PipelineSettings::from_config(config),
            config.retrieval_top_k,
        ))
    }
}

#[async_trait]
impl DocumentApi for DocumentService {
    async fn upload(&self, bytes: Vec<u8>, filename: String) -> Result<String, IngestError> {
        self.pipeline.ingest(&bytes, &filename).await
    }

    fn task_status(&self, task_id: &str) -> TaskSnapshot {
        self.pipeline.registry().get(task_id)
    }

    async fn ask(&self, question: &str) -> AnswerResponse {
        self.ranker.answer(question).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
