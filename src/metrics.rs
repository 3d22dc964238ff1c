use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and query activity.
#[derive(Default)]
pub struct ServiceMetrics {
    documents_ingested: AtomicU64,
    documents_failed: AtomicU64,
    chunks_indexed: AtomicU64,
    questions_answered: AtomicU64,
}

impl ServiceMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an indexed document and the number of chunks stored for it.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed
            .fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record an ingestion that ended in the failed state.
    pub fn record_failure(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a handled question, whatever its outcome.
    pub fn record_question(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of service counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents indexed since startup.
    pub documents_ingested: u64,
    /// Ingestions that ended in the failed state.
    pub documents_failed: u64,
    /// Total chunks stored across all indexed documents.
    pub chunks_indexed: u64,
    /// Questions handled by the ranker.
    pub questions_answered: u64,
}
