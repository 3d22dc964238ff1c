//! Embedding collaborator: turns chunk and question text into fixed-size vectors.
//!
//! Three adapters are available. The OpenAI and Ollama clients call their HTTP APIs; the local
//! hashing embedder needs no network access and is deterministic, which keeps similarity search
//! reproducible in tests and offline deployments.

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider answered, but not with one vector of the configured size per input.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied chunk of text.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;

    /// Embed a single text, typically a question.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
        let mut vectors = self.generate_embeddings(vec![text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingClientError::InvalidResponse("no vector returned".into()))
    }
}

/// Deterministic embedder based on the hashing trick.
///
/// Every lowercase alphanumeric token is hashed (FNV-1a) into one of `dimension` buckets and the
/// resulting counts are L2-normalised, so texts that share vocabulary land close together.
pub struct LocalHashEmbedder {
    dimension: usize,
}

impl LocalHashEmbedder {
    /// Construct a hashing embedder producing vectors of the given size.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let bucket = fnv1a(&token.to_lowercase()) % self.dimension as u64;
            embedding[bucket as usize] += 1.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[async_trait]
impl EmbeddingClient for LocalHashEmbedder {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        Ok(texts.iter().map(|text| self.encode(text)).collect())
    }
}

/// Client for OpenAI-compatible `/embeddings` endpoints.
pub struct OpenAiEmbeddingClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
}

impl OpenAiEmbeddingClient {
    /// Build a client targeting `base_url` (for example `https://api.openai.com/v1`).
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        model: String,
        dimension: usize,
    ) -> Result<Self, EmbeddingClientError> {
        let http = Client::builder()
            .user_agent("docqa/embed")
            .build()
            .map_err(|error| EmbeddingClientError::GenerationFailed(error.to_string()))?;
        Ok(Self {
            http,
            base_url,
            api_key,
            model,
            dimension,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingItem>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        tracing::debug!(model = %self.model, inputs = texts.len(), "Requesting OpenAI embeddings");
        let expected = texts.len();
        let mut request = self.http.post(self.endpoint()).json(&json!({
            "model": self.model,
            "input": texts,
        }));
        if let Some(key) = self.api_key.as_deref() {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|error| {
            EmbeddingClientError::GenerationFailed(format!("failed to reach {}: {error}", self.base_url))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "embedding endpoint returned {status}: {body}"
            )));
        }

        let mut body: OpenAiEmbeddingResponse = response
            .json()
            .await
            .map_err(|error| EmbeddingClientError::InvalidResponse(error.to_string()))?;
        body.data.sort_by_key(|item| item.index);
        let vectors = body.data.into_iter().map(|item| item.embedding).collect();
        validate_vectors(vectors, expected, self.dimension)
    }
}

/// Client for the Ollama `/api/embed` endpoint.
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

impl OllamaEmbeddingClient {
    /// Build a client targeting the Ollama runtime at `base_url`.
    pub fn new(
        base_url: String,
        model: String,
        dimension: usize,
    ) -> Result<Self, EmbeddingClientError> {
        let http = Client::builder()
            .user_agent("docqa/embed")
            .build()
            .map_err(|error| EmbeddingClientError::GenerationFailed(error.to_string()))?;
        Ok(Self {
            http,
            base_url,
            model,
            dimension,
        })
    }
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let expected = texts.len();
        let response = self
            .http
            .post(format!("{}/api/embed", self.base_url.trim_end_matches('/')))
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::GenerationFailed(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|error| EmbeddingClientError::InvalidResponse(error.to_string()))?;
        validate_vectors(body.embeddings, expected, self.dimension)
    }
}

fn validate_vectors(
    vectors: Vec<Vec<f32>>,
    expected: usize,
    dimension: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
    if vectors.len() != expected {
        return Err(EmbeddingClientError::InvalidResponse(format!(
            "expected {expected} vectors, got {}",
            vectors.len()
        )));
    }
    if let Some(bad) = vectors.iter().find(|vector| vector.len() != dimension) {
        return Err(EmbeddingClientError::InvalidResponse(format!(
            "expected dimension {dimension}, got {}",
            bad.len()
        )));
    }
    Ok(vectors)
}

/// Build an embedding client suitable for the current configuration.
pub fn get_embedding_client(
    config: &Config,
) -> Result<Box<dyn EmbeddingClient>, EmbeddingClientError> {
    tracing::debug!(
        provider = ?config.embedding_provider,
        model = %config.embedding_model,
        dimension = config.embedding_dimension,
        "Initializing embedding client"
    );
    Ok(match config.embedding_provider {
        EmbeddingProvider::Local => Box::new(LocalHashEmbedder::new(config.embedding_dimension)),
        EmbeddingProvider::OpenAI => Box::new(OpenAiEmbeddingClient::new(
            config.openai_base_url.clone(),
            config.openai_api_key.clone(),
            config.embedding_model.clone(),
            config.embedding_dimension,
        )?),
        EmbeddingProvider::Ollama => Box::new(OllamaEmbeddingClient::new(
            config.ollama_url.clone(),
            config.embedding_model.clone(),
            config.embedding_dimension,
        )?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn hashing_embedder_is_deterministic_and_normalised() {
        let embedder = LocalHashEmbedder::new(64);
        let first = embedder.embed("Rust ownership rules").await.expect("vector");
        let second = embedder.embed("rust OWNERSHIP rules").await.expect("vector");

        assert_eq!(first.len(), 64);
        assert_eq!(first, second);
        assert!((cosine(&first, &first) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn hashing_embedder_scores_shared_vocabulary_higher() {
        let embedder = LocalHashEmbedder::new(256);
        let query = embedder.embed("borrow checker lifetimes").await.expect("vector");
        let related = embedder
            .embed("The borrow checker validates lifetimes.")
            .await
            .expect("vector");
        let unrelated = embedder
            .embed("Bananas grow in tropical climates.")
            .await
            .expect("vector");

        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }

    #[tokio::test]
    async fn hashing_embedder_rejects_empty_batches() {
        let error = LocalHashEmbedder::new(8)
            .generate_embeddings(Vec::new())
            .await
            .expect_err("empty batch");
        assert!(matches!(error, EmbeddingClientError::GenerationFailed(_)));
    }

    #[tokio::test]
    async fn openai_client_orders_vectors_by_index() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/embeddings")
                    .header("authorization", "Bearer sk-test");
                then.status(200).json_body(json!({
                    "data": [
                        { "index": 1, "embedding": [0.0, 1.0] },
                        { "index": 0, "embedding": [1.0, 0.0] }
                    ]
                }));
            })
            .await;

        let client = OpenAiEmbeddingClient::new(
            server.base_url(),
            Some("sk-test".into()),
            "text-embedding-3-small".into(),
            2,
        )
        .expect("client");
        let vectors = client
            .generate_embeddings(vec!["a".into(), "b".into()])
            .await
            .expect("vectors");

        mock.assert();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn ollama_client_rejects_wrong_dimension() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(200)
                    .json_body(json!({ "embeddings": [[0.1, 0.2, 0.3]] }));
            })
            .await;

        let client =
            OllamaEmbeddingClient::new(server.base_url(), "nomic-embed-text".into(), 768)
                .expect("client");
        let error = client
            .generate_embeddings(vec!["hello".into()])
            .await
            .expect_err("dimension mismatch");

        assert!(matches!(error, EmbeddingClientError::InvalidResponse(message) if message.contains("768")));
    }
}
