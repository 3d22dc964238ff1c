use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_QDRANT_URL: &str = "http://127.0.0.1:6333";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the document question-answering server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Directory receiving uploaded files before extraction.
    pub upload_dir: PathBuf,
    /// Upper bound on a single upload request body.
    pub max_upload_bytes: usize,
    /// Backend holding the per-document collections.
    pub vector_store: VectorStoreKind,
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Number of chunks sent to the embedding provider per request.
    pub embedding_batch_size: usize,
    /// Provider answering questions and writing summaries.
    pub generation_provider: GenerationProvider,
    /// Chat/generation model identifier.
    pub llm_model: String,
    /// Bearer token for OpenAI-compatible endpoints.
    pub openai_api_key: Option<String>,
    /// Base URL for OpenAI-compatible endpoints.
    pub openai_base_url: String,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Sentences kept on each side of a chunk's center sentence.
    pub sentence_window_size: usize,
    /// Chunks retrieved from each collection per question.
    pub retrieval_top_k: usize,
    /// Characters of document text forwarded for summarization.
    pub summary_input_chars: usize,
}

/// Supported embedding backends for the processing pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI embeddings API.
    OpenAI,
    /// Deterministic in-process hashing embedder.
    Local,
}

/// Supported generative backends for answers and summaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    /// Local Ollama runtime.
    Ollama,
    /// OpenAI-compatible chat completions.
    OpenAI,
}

/// Storage engine backing the collections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreKind {
    /// Durable Qdrant collections.
    Qdrant,
    /// Process-lifetime in-memory collections.
    Memory,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server_port: parse_optional("SERVER_PORT")?,
            upload_dir: load_env_optional("UPLOAD_DIR")
                .unwrap_or_else(|| "uploads".to_string())
                .into(),
            max_upload_bytes: parse_optional("MAX_UPLOAD_BYTES")?.unwrap_or(50 * 1024 * 1024),
            vector_store: parse_choice("VECTOR_STORE", VectorStoreKind::Qdrant)?,
            qdrant_url: load_env_optional("QDRANT_URL")
                .unwrap_or_else(|| DEFAULT_QDRANT_URL.to_string()),
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            embedding_provider: parse_choice("EMBEDDING_PROVIDER", EmbeddingProvider::Local)?,
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            embedding_dimension: parse_optional("EMBEDDING_DIMENSION")?.unwrap_or(384),
            embedding_batch_size: parse_optional("EMBEDDING_BATCH_SIZE")?
                .unwrap_or(64)
                .max(1),
            generation_provider: parse_choice("GENERATION_PROVIDER", GenerationProvider::OpenAI)?,
            llm_model: load_env_optional("LLM_MODEL")
                .unwrap_or_else(|| "gpt-3.5-turbo".to_string()),
            openai_api_key: load_env_optional("OPENAI_API_KEY"),
            openai_base_url: load_env_optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            ollama_url: load_env_optional("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            sentence_window_size: parse_optional("SENTENCE_WINDOW_SIZE")?.unwrap_or(5),
            retrieval_top_k: parse_optional("RETRIEVAL_TOP_K")?.unwrap_or(4).max(1),
            summary_input_chars: parse_optional("SUMMARY_INPUT_CHARS")?.unwrap_or(4000),
        })
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn parse_choice<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    Ok(parse_optional(key)?.unwrap_or(default))
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "local" => Ok(Self::Local),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for GenerationProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for VectorStoreKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "qdrant" => Ok(Self::Qdrant),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        vector_store = ?config.vector_store,
        qdrant_url = %config.qdrant_url,
        server_port = ?config.server_port,
        embedding_provider = ?config.embedding_provider,
        generation_provider = ?config.generation_provider,
        window = config.sentence_window_size,
        top_k = config.retrieval_top_k,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
