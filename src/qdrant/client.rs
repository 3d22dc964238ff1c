//! HTTP client wrapper for interacting with Qdrant.

use crate::qdrant::{
    payload::{build_payload, current_timestamp_rfc3339, generate_point_id, parse_scored_payload},
    types::{
        ListCollectionsResponse, QdrantError, QueryPoint, QueryResponse, QueryResponseResult,
    },
};
use crate::store::{
    COLLECTION_PREFIX, CollectionStore, ScoredChunk, StoreError, StoredChunk, rank_chunks,
};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::json;

/// Lightweight HTTP client for Qdrant operations.
pub struct QdrantService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) vector_size: u64,
}

impl QdrantService {
    /// Construct a client for the Qdrant instance at `url`, creating collections of
    /// `vector_size` dimensions with cosine distance.
    pub fn new(url: &str, api_key: Option<String>, vector_size: u64) -> Result<Self, QdrantError> {
        let client = Client::builder().user_agent("docqa/0.1").build()?;

        let base_url = normalize_base_url(url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = %api_key
                .as_deref()
                .map(|value| !value.is_empty())
                .unwrap_or(false),
            vector_size,
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key,
            vector_size,
        })
    }

    /// Create a collection sized for this service's vectors.
    pub async fn create_collection(&self, collection_name: &str) -> Result<(), QdrantError> {
        let body = json!({
            "vectors": {
                "size": self.vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}"))
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, "Collection created");
        })
        .await
    }

    /// Retrieve the names of all collections present in Qdrant.
    pub async fn list_collections(&self) -> Result<Vec<String>, QdrantError> {
        let response = self.request(Method::GET, "collections").send().await?;

        if response.status().is_success() {
            let payload: ListCollectionsResponse = response.json().await?;
            let names = payload
                .result
                .collections
                .into_iter()
                .map(|collection| collection.name)
                .collect();
            Ok(names)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Failed to list collections");
            Err(error)
        }
    }

    /// Upload new vectors to the given collection.
    pub async fn index_points(
        &self,
        collection_name: &str,
        chunks: Vec<StoredChunk>,
    ) -> Result<usize, QdrantError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let now = current_timestamp_rfc3339();
        let serialized: Vec<_> = chunks
            .iter()
            .map(|chunk| {
                json!({
                    "id": generate_point_id(),
                    "vector": chunk.vector,
                    "payload": build_payload(chunk, &now),
                })
            })
            .collect();

        let point_count = serialized.len();
        let response = self
            .request(
                Method::PUT,
                &format!("collections/{collection_name}/points"),
            )
            .query(&[("wait", true)])
            .json(&json!({ "points": serialized }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = collection_name,
                points = point_count,
                "Points indexed"
            );
        })
        .await?;

        Ok(point_count)
    }

    /// Perform a similarity search against a collection, returning raw scores and payloads.
    ///
    /// Returns `Ok(None)` when the collection does not exist.
    pub(crate) async fn search_points(
        &self,
        collection_name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Option<Vec<QueryPoint>>, QdrantError> {
        let body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/query"),
            )
            .json(&body)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection = collection_name, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        Ok(Some(points))
    }

    /// Delete a collection. Returns `Ok(false)` when it did not exist.
    pub async fn delete_collection(&self, collection_name: &str) -> Result<bool, QdrantError> {
        let response = self
            .request(Method::DELETE, &format!("collections/{collection_name}"))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, "Collection deleted");
        })
        .await?;
        Ok(true)
    }

    /// Check whether a collection exists.
    pub async fn collection_exists(&self, collection_name: &str) -> Result<bool, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection_name}"))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::error!(collection = collection_name, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = self.api_key.as_deref().filter(|key| !key.is_empty()) {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl CollectionStore for QdrantService {
    async fn create(&self, id: &str) -> Result<(), StoreError> {
        if self.collection_exists(id).await? {
            return Err(StoreError::DuplicateCollection(id.to_string()));
        }
        self.create_collection(id).await?;
        Ok(())
    }

    async fn add(&self, id: &str, chunks: Vec<StoredChunk>) -> Result<usize, StoreError> {
        Ok(self.index_points(id, chunks).await?)
    }

    async fn query(
        &self,
        id: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let points = self
            .search_points(id, vector, k)
            .await?
            .ok_or_else(|| StoreError::UnknownCollection(id.to_string()))?;
        let chunks = points
            .into_iter()
            .map(|point| parse_scored_payload(id, point.score, point.payload))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rank_chunks(chunks, k))
    }

    async fn list_all(&self) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self
            .list_collections()
            .await?
            .into_iter()
            .filter(|name| name.starts_with(COLLECTION_PREFIX))
            .collect();
        names.sort();
        Ok(names)
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        if self.delete_collection(id).await? {
            Ok(())
        } else {
            Err(StoreError::UnknownCollection(id.to_string()))
        }
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
