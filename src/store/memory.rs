//! Process-lifetime collection store.

use super::{
    COLLECTION_PREFIX, CollectionStore, ScoredChunk, StoreError, StoredChunk, cosine_similarity,
    rank_chunks,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

/// Collections held in memory; lost on restart.
#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<BTreeMap<String, Vec<StoredChunk>>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunks held by `id`, if the collection exists.
    pub fn chunk_count(&self, id: &str) -> Option<usize> {
        self.collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(Vec::len)
    }
}

#[async_trait]
impl CollectionStore for InMemoryStore {
    async fn create(&self, id: &str) -> Result<(), StoreError> {
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if collections.contains_key(id) {
            return Err(StoreError::DuplicateCollection(id.to_string()));
        }
        collections.insert(id.to_string(), Vec::new());
        Ok(())
    }

    async fn add(&self, id: &str, chunks: Vec<StoredChunk>) -> Result<usize, StoreError> {
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let collection = collections
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownCollection(id.to_string()))?;
        let count = chunks.len();
        collection.extend(chunks);
        Ok(count)
    }

    async fn query(
        &self,
        id: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let collections = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let collection = collections
            .get(id)
            .ok_or_else(|| StoreError::UnknownCollection(id.to_string()))?;
        let scored = collection
            .iter()
            .map(|chunk| ScoredChunk {
                ordinal: chunk.ordinal,
                text: chunk.text.clone(),
                window_text: chunk.window_text.clone(),
                source_path: chunk.source_path.clone(),
                score: cosine_similarity(vector, &chunk.vector),
            })
            .collect();
        Ok(rank_chunks(scored, k))
    }

    async fn list_all(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|id| id.starts_with(COLLECTION_PREFIX))
            .cloned()
            .collect())
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::UnknownCollection(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(ordinal: usize, vector: Vec<f32>) -> StoredChunk {
        StoredChunk {
            ordinal,
            text: format!("sentence {ordinal}"),
            window_text: format!("window {ordinal}"),
            source_path: "uploads/a.txt".into(),
            vector,
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicates() {
        let store = InMemoryStore::new();
        store.create("doc_a").await.expect("first create");
        let error = store.create("doc_a").await.expect_err("duplicate");
        assert!(matches!(error, StoreError::DuplicateCollection(id) if id == "doc_a"));
    }

    #[tokio::test]
    async fn query_ranks_by_similarity_with_stable_ties() {
        let store = InMemoryStore::new();
        store.create("doc_a").await.expect("create");
        store
            .add(
                "doc_a",
                vec![
                    chunk(0, vec![0.0, 1.0]),
                    chunk(1, vec![1.0, 0.0]),
                    chunk(2, vec![2.0, 0.0]),
                    chunk(3, vec![1.0, 1.0]),
                ],
            )
            .await
            .expect("add");

        let hits = store.query("doc_a", &[1.0, 0.0], 3).await.expect("query");
        let order: Vec<_> = hits.iter().map(|hit| hit.ordinal).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!(hits.iter().all(|hit| (0.0..=1.0).contains(&hit.score)));
    }

    #[tokio::test]
    async fn query_on_empty_collection_returns_nothing() {
        let store = InMemoryStore::new();
        store.create("doc_a").await.expect("create");
        assert!(store.query("doc_a", &[1.0], 4).await.expect("query").is_empty());
    }

    #[tokio::test]
    async fn list_all_is_sorted_and_remove_forgets() {
        let store = InMemoryStore::new();
        for id in ["doc_c", "scratch", "doc_a", "doc_b"] {
            store.create(id).await.expect("create");
        }
        assert_eq!(store.list_all().await.expect("list"), vec!["doc_a", "doc_b", "doc_c"]);

        store.remove("doc_b").await.expect("remove");
        assert_eq!(store.list_all().await.expect("list"), vec!["doc_a", "doc_c"]);
        assert!(matches!(
            store.add("doc_b", Vec::new()).await,
            Err(StoreError::UnknownCollection(_))
        ));
    }
}
