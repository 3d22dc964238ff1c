//! Document processing: sentence-window chunking and the background ingestion pipeline.

pub mod chunking;
pub mod pipeline;
pub mod types;

pub use chunking::{ChunkWindower, WindowedChunk};
pub use pipeline::{IngestionPipeline, PipelineSettings, SUMMARY_FALLBACK};
pub use types::{ChunkingError, IngestError, PipelineError};
