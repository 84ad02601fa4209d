//! Gemini embedding and generation over the Generative Language REST API.
//!
//! This module is only available when the `gemini` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::http;
use crate::llm::LlmClient;

const PROVIDER: &str = "Gemini";

/// The default Generative Language API base URL.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// The default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";

/// The default generation model.
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-2.5-flash";

/// Dimensionality of `text-embedding-004`.
const DEFAULT_DIMENSIONS: usize = 768;

/// Transport-level ceiling; callers apply tighter per-operation timeouts.
const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// How the embedding will be used. Gemini tunes vectors per task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// Embeddings of documents to be searched.
    RetrievalDocument,
    /// Embeddings of search queries.
    RetrievalQuery,
    /// Plain semantic similarity.
    SemanticSimilarity,
}

#[derive(Debug, Clone)]
struct Connection {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl Connection {
    fn new(api_key: String, on_error: impl Fn(String) -> RagError) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(on_error("API key must not be empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| on_error(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, api_key, base_url: DEFAULT_BASE_URL.to_string() })
    }

    fn from_env(on_error: impl Fn(String) -> RagError) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| on_error("GEMINI_API_KEY environment variable not set".into()))?;
        Self::new(api_key, on_error)
    }

    fn url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{model}:{method}", self.base_url.trim_end_matches('/'))
    }

    /// POST `body`, returning the parsed response or `(message, transient)`.
    async fn post<B, R>(&self, url: &str, body: &B) -> std::result::Result<R, (String, bool)>
    where
        B: Serialize + Sync,
        R: DeserializeOwned + Send,
    {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| (format!("request failed: {e}"), true))?;

        if !response.status().is_success() {
            return Err(http::failure(response).await);
        }
        response.json().await.map_err(|e| (format!("failed to parse response: {e}"), false))
    }
}

// ── Request/response types ─────────────────────────────────────────

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: TaskType,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: ContentEmbedding,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    fn text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        (!text.is_empty()).then_some(text)
    }
}

// ── Embedding provider ─────────────────────────────────────────────

/// An [`EmbeddingProvider`] backed by the Gemini `embedContent` API.
///
/// # Configuration
///
/// - `model` – defaults to `text-embedding-004` (768 dimensions).
/// - `task_type` – defaults to [`TaskType::RetrievalDocument`]. Build a
///   second provider with [`TaskType::RetrievalQuery`] and pass it to
///   [`RagPipelineBuilder::query_embedding_provider`](crate::RagPipelineBuilder::query_embedding_provider)
///   to embed questions the way Gemini expects.
/// - `output_dimensionality` – optional truncation of the output vector.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::gemini::GeminiEmbeddingProvider;
///
/// let provider = GeminiEmbeddingProvider::new("your-api-key")?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct GeminiEmbeddingProvider {
    connection: Connection,
    model: String,
    task_type: TaskType,
    output_dimensionality: Option<usize>,
    dimensions: usize,
}

fn embedding_error(message: String) -> RagError {
    RagError::embedding(PROVIDER, message, false)
}

impl GeminiEmbeddingProvider {
    /// Create a provider with the given API key and default model.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self::with_connection(Connection::new(api_key.into(), embedding_error)?))
    }

    /// Create a provider using the `GEMINI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Ok(Self::with_connection(Connection::from_env(embedding_error)?))
    }

    fn with_connection(connection: Connection) -> Self {
        Self {
            connection,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            task_type: TaskType::RetrievalDocument,
            output_dimensionality: None,
            dimensions: DEFAULT_DIMENSIONS,
        }
    }

    /// Set the model name, with or without the `models/` prefix.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model: String = model.into();
        self.model = model.trim_start_matches("models/").to_string();
        self
    }

    /// Set the task type used for embedding requests.
    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }

    /// Set the output dimensionality (truncates the embedding vector).
    pub fn with_output_dimensionality(mut self, dims: usize) -> Self {
        self.output_dimensionality = Some(dims);
        self.dimensions = dims;
        self
    }

    /// Override the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.connection.base_url = base_url.into();
        self
    }

    fn request<'a>(&self, text: &'a str) -> EmbedRequest<'a> {
        EmbedRequest {
            model: format!("models/{}", self.model),
            content: Content { role: None, parts: vec![Part { text }] },
            task_type: self.task_type,
            output_dimensionality: self.output_dimensionality,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let url = self.connection.url(&self.model, "embedContent");
        let response: EmbedResponse =
            self.connection.post(&url, &self.request(text)).await.map_err(|(message, transient)| {
                error!(provider = PROVIDER, error = %message, "embedding request failed");
                RagError::embedding(PROVIDER, message, transient)
            })?;

        Ok(response.embedding.values)
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), "embedding batch");

        let url = self.connection.url(&self.model, "batchEmbedContents");
        let body = BatchEmbedRequest { requests: texts.iter().map(|t| self.request(t)).collect() };
        let response: BatchEmbedResponse =
            self.connection.post(&url, &body).await.map_err(|(message, transient)| {
                error!(provider = PROVIDER, error = %message, "batch embedding request failed");
                RagError::embedding(PROVIDER, message, transient)
            })?;

        if response.embeddings.len() != texts.len() {
            return Err(RagError::embedding(
                PROVIDER,
                format!(
                    "API returned {} embeddings for {} inputs",
                    response.embeddings.len(),
                    texts.len()
                ),
                false,
            ));
        }
        Ok(response.embeddings.into_iter().map(|e| e.values).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ── LLM client ─────────────────────────────────────────────────────

/// An [`LlmClient`] backed by the Gemini `generateContent` API.
pub struct GeminiClient {
    connection: Connection,
    model: String,
}

fn llm_error(message: String) -> RagError {
    RagError::llm(PROVIDER, message, false)
}

impl GeminiClient {
    /// Create a client with the given API key and default model.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            connection: Connection::new(api_key.into(), llm_error)?,
            model: DEFAULT_GENERATION_MODEL.to_string(),
        })
    }

    /// Create a client using the `GEMINI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            connection: Connection::from_env(llm_error)?,
            model: DEFAULT_GENERATION_MODEL.to_string(),
        })
    }

    /// Set the generation model (e.g. `gemini-2.5-pro`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.connection.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(provider = PROVIDER, model = %self.model, prompt_len = prompt.len(), "generating");

        let url = self.connection.url(&self.model, "generateContent");
        let body = GenerateRequest {
            contents: vec![Content { role: Some("user"), parts: vec![Part { text: prompt }] }],
        };
        let response: GenerateResponse =
            self.connection.post(&url, &body).await.map_err(|(message, transient)| {
                error!(provider = PROVIDER, error = %message, "generation request failed");
                RagError::llm(PROVIDER, message, transient)
            })?;

        response
            .text()
            .ok_or_else(|| RagError::llm(PROVIDER, "response contained no text candidate", false))
    }
}
