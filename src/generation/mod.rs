//! Generative collaborator: answers questions from retrieved context and writes document summaries.
//!
//! Both operations reduce to one prompt/response exchange, so providers only implement
//! [`LanguageModel::generate`]; the prompt contracts live in [`prompts`]. The Ollama client issues
//! plain `/api/generate` requests and the OpenAI client targets any chat-completions compatible
//! endpoint.

pub mod prompts;

use crate::config::{Config, GenerationProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced while calling the generative provider.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Provider was unreachable or not configured.
    #[error("Generation provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate text: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed or was empty.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// A single prompt exchange.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Instructions framing the model's role.
    pub system: String,
    /// User prompt carrying the task input.
    pub prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Optional cap on generated tokens.
    pub max_tokens: Option<u32>,
}

/// Interface implemented by generative providers.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run one prompt exchange and return the trimmed completion.
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;

    /// Answer `question` strictly from the supplied context passages.
    async fn complete(&self, context: &[String], question: &str) -> Result<String, GenerationError> {
        let text = self.generate(prompts::answer_request(context, question)).await?;
        non_empty(text)
    }

    /// Summarize `text` in at most `max_sentences` sentences.
    async fn summarize(&self, text: &str, max_sentences: usize) -> Result<String, GenerationError> {
        let summary = self
            .generate(prompts::summary_request(text, max_sentences))
            .await?;
        non_empty(summary)
    }
}

fn non_empty(text: String) -> Result<String, GenerationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(GenerationError::InvalidResponse(
            "provider returned an empty completion".into(),
        ));
    }
    Ok(trimmed.to_string())
}

/// Build a language model client based on configuration.
pub fn get_language_model(config: &Config) -> Result<Box<dyn LanguageModel>, GenerationError> {
    tracing::debug!(
        provider = ?config.generation_provider,
        model = %config.llm_model,
        "Initializing generation client"
    );
    Ok(match config.generation_provider {
        GenerationProvider::Ollama => Box::new(OllamaClient::new(
            config.ollama_url.clone(),
            config.llm_model.clone(),
        )?),
        GenerationProvider::OpenAI => Box::new(OpenAiChatClient::new(
            config.openai_base_url.clone(),
            config.openai_api_key.clone(),
            config.llm_model.clone(),
        )?),
    })
}

fn build_http(user_agent: &str) -> Result<Client, GenerationError> {
    Client::builder()
        .user_agent(user_agent)
        .build()
        .map_err(|error| GenerationError::ProviderUnavailable(error.to_string()))
}

/// Client for the Ollama `/api/generate` endpoint.
pub struct OllamaClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    /// Build a client for the Ollama runtime at `base_url`.
    pub fn new(base_url: String, model: String) -> Result<Self, GenerationError> {
        Ok(Self {
            http: build_http("docqa/generate")?,
            base_url,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let mut options = json!({ "temperature": request.temperature });
        if let Some(max_tokens) = request.max_tokens {
            options["num_predict"] = json!(max_tokens);
        }
        let payload = json!({
            "model": self.model,
            "system": request.system,
            "prompt": request.prompt,
            "stream": false,
            "options": options,
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GenerationError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            GenerationError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(GenerationError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiChatClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiChatClient {
    /// Build a client targeting `base_url` (for example `https://api.openai.com/v1`).
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        model: String,
    ) -> Result<Self, GenerationError> {
        Ok(Self {
            http: build_http("docqa/chat")?,
            base_url,
            api_key,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl LanguageModel for OpenAiChatClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let mut payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
            "temperature": request.temperature,
        });
        if let Some(max_tokens) = request.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }

        let mut builder = self.http.post(self.endpoint()).json(&payload);
        if let Some(key) = self.api_key.as_deref() {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|error| {
            GenerationError::ProviderUnavailable(format!(
                "failed to reach {}: {error}",
                self.base_url
            ))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::GenerationFailed(format!(
                "chat endpoint returned {status}: {body}"
            )));
        }

        let body: ChatResponse = response.json().await.map_err(|error| {
            GenerationError::InvalidResponse(format!("failed to decode chat response: {error}"))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| GenerationError::InvalidResponse("response carried no choices".into()))
    }
}
