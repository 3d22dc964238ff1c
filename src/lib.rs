#![deny(missing_docs)]

//! Core library for the document question-answering server.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Text extraction from uploaded files.
pub mod extract;
/// Generative answering and summarization clients.
pub mod generation;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and query counters.
pub mod metrics;
/// Sentence-window chunking and the ingestion pipeline.
pub mod processing;
/// Qdrant vector store integration.
pub mod qdrant;
/// Relevance labels for client display.
pub mod relevance;
/// Cross-collection retrieval and answer selection.
pub mod retrieval;
/// Service facade wiring the pipeline and ranker together.
pub mod service;
/// Per-document collection storage.
pub mod store;
/// Ingestion task registry.
pub mod tasks;
