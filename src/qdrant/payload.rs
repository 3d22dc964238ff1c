//! Helpers for building and reading Qdrant chunk payloads.

use crate::store::{ScoredChunk, StoreError, StoredChunk};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

/// Build the payload object stored alongside each indexed chunk.
pub(crate) fn build_payload(chunk: &StoredChunk, timestamp_rfc3339: &str) -> Value {
    let mut payload = Map::new();
    payload.insert("text".into(), Value::String(chunk.text.clone()));
    payload.insert("window".into(), Value::String(chunk.window_text.clone()));
    payload.insert(
        "source_path".into(),
        Value::String(chunk.source_path.clone()),
    );
    payload.insert("ordinal".into(), Value::from(chunk.ordinal as u64));
    payload.insert(
        "chunk_hash".into(),
        Value::String(compute_chunk_hash(&chunk.text)),
    );
    payload.insert(
        "ingested_at".into(),
        Value::String(timestamp_rfc3339.to_string()),
    );
    Value::Object(payload)
}

/// Rebuild a scored chunk from a search hit, requiring every field the ranker relies on.
pub(crate) fn parse_scored_payload(
    collection: &str,
    score: f32,
    payload: Option<Map<String, Value>>,
) -> Result<ScoredChunk, StoreError> {
    let missing = |field: &'static str| StoreError::IncompleteRecord {
        collection: collection.to_string(),
        field,
    };
    let payload = payload.ok_or_else(|| missing("payload"))?;
    let text = |field: &'static str| {
        payload
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| missing(field))
    };

    Ok(ScoredChunk {
        ordinal: payload
            .get("ordinal")
            .and_then(Value::as_u64)
            .ok_or_else(|| missing("ordinal"))? as usize,
        text: text("text")?,
        window_text: text("window")?,
        source_path: text("source_path")?,
        score,
    })
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Construct a point identifier.
pub(crate) fn generate_point_id() -> String {
    Uuid::new_v4().to_string()
}
