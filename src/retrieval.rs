//! Cross-collection retrieval and answer selection.
//!
//! A question is embedded once and run against every document collection concurrently. Each
//! collection that returns chunks becomes a candidate scored by the mean similarity of those
//! chunks. The best-scoring candidate is answered by the generative model from its own chunks
//! only, so a response never mixes sources from two documents.
//!
//! Ties on the aggregate score go to the collection enumerated first by
//! [`CollectionStore::list_all`], which is lexicographic order.

use crate::{
    embedding::EmbeddingClient,
    generation::LanguageModel,
    metrics::ServiceMetrics,
    store::{CollectionStore, ScoredChunk},
};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Answer returned when no collection exists yet.
pub const NO_DOCUMENTS_ANSWER: &str = "No documents have been uploaded yet.";
/// Answer returned when no collection produced a usable candidate.
pub const NO_RELEVANT_ANSWER: &str = "No relevant information found in the uploaded documents.";

/// Default number of chunks retrieved from each collection.
pub const DEFAULT_TOP_K: usize = 4;

/// One supporting chunk cited with an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Path of the originating file.
    pub source: String,
    /// Exact chunk text.
    pub text: String,
    /// Similarity to the question, in `[0, 1]`.
    pub score: f32,
}

/// Answer text plus the chunks it was drawn from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResponse {
    /// Generated answer or an explanatory message.
    pub answer: String,
    /// Supporting chunks, all from the same collection.
    pub sources: Vec<Source>,
}

impl AnswerResponse {
    fn message(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            sources: Vec::new(),
        }
    }
}

/// One collection's retrieved chunks and their mean score.
#[derive(Debug, Clone)]
struct Candidate {
    collection: String,
    chunks: Vec<ScoredChunk>,
    aggregate_score: f32,
}

/// Arithmetic mean of chunk scores; `0.0` for no chunks.
pub fn aggregate_score(chunks: &[ScoredChunk]) -> f32 {
    if chunks.is_empty() {
        return 0.0;
    }
    chunks.iter().map(|chunk| chunk.score).sum::<f32>() / chunks.len() as f32
}

/// Fans a question out over every collection and returns the single best answer.
#[derive(Clone)]
pub struct RetrievalRanker {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn CollectionStore>,
    llm: Arc<dyn LanguageModel>,
    metrics: Arc<ServiceMetrics>,
    top_k: usize,
}

impl RetrievalRanker {
    /// Build a ranker retrieving `top_k` chunks per collection.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn CollectionStore>,
        llm: Arc<dyn LanguageModel>,
        metrics: Arc<ServiceMetrics>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            llm,
            metrics,
            top_k: top_k.max(1),
        }
    }

    /// Answer `question` from the most relevant document. Never fails; errors become the answer text.
    pub async fn answer(&self, question: &str) -> AnswerResponse {
        let started = Instant::now();
        tracing::info!(question, "Answering question");
        self.metrics.record_question();

        let response = match self.rank(question).await {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(error = %error, "Failed to query documents");
                AnswerResponse::message(format!("Error during document retrieval: {error}"))
            }
        };

        tracing::info!(
            sources = response.sources.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Question answered"
        );
        response
    }

    async fn rank(&self, question: &str) -> Result<AnswerResponse, RankError> {
        let collections = self.store.list_all().await?;
        if collections.is_empty() {
            return Ok(AnswerResponse::message(NO_DOCUMENTS_ANSWER));
        }

        let vector = self.embedder.embed(question).await?;
        let candidates = self.candidates(collections, &vector).await;

        for candidate in order_candidates(candidates) {
            let context: Vec<String> = candidate
                .chunks
                .iter()
                .map(|chunk| chunk.window_text.clone())
                .collect();
            match self.llm.complete(&context, question).await {
                Ok(answer) => {
                    tracing::info!(
                        collection = %candidate.collection,
                        aggregate_score = candidate.aggregate_score,
                        "Selected best collection"
                    );
                    return Ok(AnswerResponse {
                        answer,
                        sources: candidate
                            .chunks
                            .into_iter()
                            .map(|chunk| Source {
                                source: chunk.source_path,
                                text: chunk.text,
                                score: chunk.score,
                            })
                            .collect(),
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        collection = %candidate.collection,
                        error = %error,
                        "Answer synthesis failed; skipping collection"
                    );
                }
            }
        }

        Ok(AnswerResponse::message(NO_RELEVANT_ANSWER))
    }

    /// Query every collection concurrently, keeping enumeration order.
    async fn candidates(&self, collections: Vec<String>, vector: &[f32]) -> Vec<Candidate> {
        let queries = collections.into_iter().map(|collection| async move {
            match self.store.query(&collection, vector, self.top_k).await {
                Ok(chunks) if chunks.is_empty() => {
                    tracing::debug!(collection = %collection, "No chunks retrieved; skipping");
                    None
                }
                Ok(chunks) => {
                    tracing::debug!(collection = %collection, chunks = chunks.len(), "Chunks retrieved");
                    Some(Candidate {
                        aggregate_score: aggregate_score(&chunks),
                        collection,
                        chunks,
                    })
                }
                Err(error) => {
                    tracing::warn!(collection = %collection, error = %error, "Collection query failed; skipping");
                    None
                }
            }
        });

        join_all(queries).await.into_iter().flatten().collect()
    }
}

/// Sort candidates by descending aggregate score. The sort is stable, so ties keep enumeration order.
fn order_candidates(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(|left, right| {
        right
            .aggregate_score
            .partial_cmp(&left.aggregate_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates
}

#[derive(Debug, thiserror::Error)]
enum RankError {
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
    #[error(transparent)]
    Embedding(#[from] crate::embedding::EmbeddingClientError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::LocalHashEmbedder;
    use crate::generation::{GenerationError, GenerationRequest};
    use crate::store::{InMemoryStore, StoreError, StoredChunk};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Echoes the first context passage so tests can see which collection answered.
    struct EchoModel {
        refuse_containing: Option<&'static str>,
        calls: Mutex<usize>,
    }

    impl EchoModel {
        fn new() -> Self {
            Self {
                refuse_containing: None,
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for EchoModel {
        async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
            *self.calls.lock().expect("lock") += 1;
            if let Some(marker) = self.refuse_containing {
                if request.prompt.contains(marker) {
                    return Err(GenerationError::GenerationFailed("refused".into()));
                }
            }
            let context = request
                .prompt
                .lines()
                .nth(2)
                .unwrap_or_default()
                .to_string();
            Ok(format!("From: {context}"))
        }
    }

    /// Store returning canned hits per collection.
    struct FixedStore {
        hits: HashMap<String, Result<Vec<f32>, ()>>,
    }

    #[async_trait]
    impl CollectionStore for FixedStore {
        async fn create(&self, _id: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn add(&self, _id: &str, chunks: Vec<StoredChunk>) -> Result<usize, StoreError> {
            Ok(chunks.len())
        }

        async fn query(
            &self,
            id: &str,
            _vector: &[f32],
            _k: usize,
        ) -> Result<Vec<ScoredChunk>, StoreError> {
            match self.hits.get(id) {
                Some(Ok(scores)) => Ok(scores
                    .iter()
                    .enumerate()
                    .map(|(ordinal, score)| ScoredChunk {
                        ordinal,
                        text: format!("{id} chunk {ordinal}"),
                        window_text: format!("{id} window {ordinal}"),
                        source_path: format!("uploads/{id}.txt"),
                        score: *score,
                    })
                    .collect()),
                Some(Err(())) => Err(StoreError::UnknownCollection(id.to_string())),
                None => Ok(Vec::new()),
            }
        }

        async fn list_all(&self) -> Result<Vec<String>, StoreError> {
            let mut ids: Vec<_> = self.hits.keys().cloned().collect();
            ids.sort();
            Ok(ids)
        }

        async fn remove(&self, _id: &str) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn ranker(store: Arc<dyn CollectionStore>, llm: Arc<dyn LanguageModel>) -> RetrievalRanker {
        RetrievalRanker::new(
            Arc::new(LocalHashEmbedder::new(32)),
            store,
            llm,
            Arc::new(ServiceMetrics::new()),
            DEFAULT_TOP_K,
        )
    }

    fn fixed(entries: &[(&str, Result<Vec<f32>, ()>)]) -> Arc<FixedStore> {
        Arc::new(FixedStore {
            hits: entries
                .iter()
                .map(|(id, hits)| (id.to_string(), hits.clone()))
                .collect(),
        })
    }

    #[tokio::test]
    async fn no_collections_yields_fixed_message() {
        let response = ranker(Arc::new(InMemoryStore::new()), Arc::new(EchoModel::new()))
            .answer("anything?")
            .await;
        assert_eq!(response.answer, NO_DOCUMENTS_ANSWER);
        assert!(response.sources.is_empty());
    }

    #[tokio::test]
    async fn empty_collections_yield_no_relevant_information() {
        let store = Arc::new(InMemoryStore::new());
        store.create("doc_a").await.expect("create");
        let response = ranker(store, Arc::new(EchoModel::new())).answer("anything?").await;
        assert_eq!(response.answer, NO_RELEVANT_ANSWER);
        assert!(response.sources.is_empty());
    }

    #[tokio::test]
    async fn highest_mean_score_wins_and_sources_stay_in_one_collection() {
        let store = fixed(&[
            ("doc_a", Ok(vec![0.9, 0.2])),
            ("doc_b", Ok(vec![0.7, 0.6, 0.5])),
        ]);
        let response = ranker(store, Arc::new(EchoModel::new())).answer("q").await;

        assert_eq!(response.answer, "From: doc_b window 0");
        assert!(response.sources.iter().all(|s| s.source == "uploads/doc_b.txt"));
        let mean = response.sources.iter().map(|s| s.score).sum::<f32>()
            / response.sources.len() as f32;
        assert!((mean - 0.6).abs() < 1e-6);
    }

    #[tokio::test]
    async fn ties_go_to_first_enumerated_collection() {
        let store = fixed(&[("doc_b", Ok(vec![0.5])), ("doc_a", Ok(vec![0.5]))]);
        let response = ranker(store, Arc::new(EchoModel::new())).answer("q").await;
        assert_eq!(response.sources[0].source, "uploads/doc_a.txt");
    }

    #[tokio::test]
    async fn failing_collection_does_not_abort_the_query() {
        let store = fixed(&[("doc_a", Err(())), ("doc_b", Ok(vec![0.4]))]);
        let response = ranker(store, Arc::new(EchoModel::new())).answer("q").await;
        assert_eq!(response.sources.len(), 1);
        assert_eq!(response.sources[0].source, "uploads/doc_b.txt");
    }

    #[tokio::test]
    async fn failed_synthesis_falls_through_to_next_candidate() {
        let store = fixed(&[("doc_a", Ok(vec![0.9])), ("doc_b", Ok(vec![0.3]))]);
        let llm = Arc::new(EchoModel {
            refuse_containing: Some("doc_a"),
            calls: Mutex::new(0),
        });
        let response = ranker(store, llm.clone()).answer("q").await;
        assert_eq!(response.sources[0].source, "uploads/doc_b.txt");
        assert_eq!(*llm.calls.lock().expect("lock"), 2);
    }

    #[tokio::test]
    async fn enumeration_failure_is_reported_in_the_answer() {
        struct DownStore;

        #[async_trait]
        impl CollectionStore for DownStore {
            async fn create(&self, _id: &str) -> Result<(), StoreError> {
                Ok(())
            }
            async fn add(&self, _id: &str, _c: Vec<StoredChunk>) -> Result<usize, StoreError> {
                Ok(0)
            }
            async fn query(
                &self,
                _id: &str,
                _v: &[f32],
                _k: usize,
            ) -> Result<Vec<ScoredChunk>, StoreError> {
                Ok(Vec::new())
            }
            async fn list_all(&self) -> Result<Vec<String>, StoreError> {
                Err(StoreError::UnknownCollection("*".into()))
            }
            async fn remove(&self, _id: &str) -> Result<(), StoreError> {
                Ok(())
            }
        }

        let response = ranker(Arc::new(DownStore), Arc::new(EchoModel::new()))
            .answer("q")
            .await;
        assert!(response.answer.starts_with("Error during document retrieval: "));
        assert!(response.sources.is_empty());
    }

    #[test]
    fn aggregate_is_the_arithmetic_mean() {
        let chunk = |score| ScoredChunk {
            ordinal: 0,
            text: String::new(),
            window_text: String::new(),
            source_path: String::new(),
            score,
        };
        assert_eq!(aggregate_score(&[]), 0.0);
        assert!((aggregate_score(&[chunk(0.2), chunk(0.4), chunk(0.9)]) - 0.5).abs() < 1e-6);
    }
}
