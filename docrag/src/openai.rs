//! OpenAI embeddings and chat completions over REST.
//!
//! Only available with the `openai` feature. Both clients accept a custom
//! base URL, so any OpenAI-compatible server works.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::http;
use crate::llm::LlmClient;

const PROVIDER: &str = "OpenAI";

/// The public OpenAI API.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// The default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default chat model.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// Native width of `text-embedding-3-small`.
const NATIVE_DIMENSIONS: usize = 1536;

#[derive(Debug, Clone)]
struct Endpoint {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl Endpoint {
    fn new(api_key: String, on_error: impl Fn(String) -> RagError) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(on_error("API key must not be empty".into()));
        }
        Ok(Self { client: reqwest::Client::new(), api_key, base_url: DEFAULT_BASE_URL.into() })
    }

    fn from_env(on_error: impl Fn(String) -> RagError) -> Result<Self> {
        match std::env::var("OPENAI_API_KEY") {
            Ok(key) => Self::new(key, on_error),
            Err(_) => Err(on_error("OPENAI_API_KEY environment variable not set".into())),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> std::result::Result<R, (String, bool)>
    where
        B: Serialize + Sync,
        R: DeserializeOwned + Send,
    {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.api_key)
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

#[derive(Serialize)]
struct EmbeddingsBody<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingsReply {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionReply {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

impl CompletionReply {
    fn text(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
    }
}

/// Embeddings from the OpenAI `/embeddings` endpoint.
///
/// `text-embedding-3-*` models accept a `dimensions` parameter; set it with
/// [`with_dimensions`](Self::with_dimensions) to match an index built for a
/// narrower model.
///
/// ```rust,ignore
/// let provider = OpenAIEmbeddingProvider::from_env()?.with_dimensions(768);
/// ```
pub struct OpenAIEmbeddingProvider {
    endpoint: Endpoint,
    model: String,
    output_dimensions: Option<usize>,
}

fn embedding_error(message: String) -> RagError {
    RagError::embedding(PROVIDER, message, false)
}

impl OpenAIEmbeddingProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self::with_endpoint(Endpoint::new(api_key.into(), embedding_error)?))
    }

    /// Read the key from `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        Ok(Self::with_endpoint(Endpoint::from_env(embedding_error)?))
    }

    fn with_endpoint(endpoint: Endpoint) -> Self {
        Self { endpoint, model: DEFAULT_EMBEDDING_MODEL.into(), output_dimensions: None }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Ask the API to shorten vectors to `dimensions`.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.output_dimensions = Some(dimensions);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.endpoint.base_url = base_url.into();
        self
    }

    fn body<'a>(&'a self, texts: &'a [&'a str]) -> EmbeddingsBody<'a> {
        EmbeddingsBody { model: &self.model, input: texts, dimensions: self.output_dimensions }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .pop()
            .ok_or_else(|| RagError::embedding(PROVIDER, "API returned no embedding", false))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = PROVIDER, model = %self.model, batch_size = texts.len(), "embedding");

        let reply: EmbeddingsReply =
            self.endpoint.post("embeddings", &self.body(texts)).await.map_err(
                |(message, transient)| {
                    error!(provider = PROVIDER, error = %message, "embedding request failed");
                    RagError::embedding(PROVIDER, message, transient)
                },
            )?;

        if reply.data.len() != texts.len() {
            return Err(RagError::embedding(
                PROVIDER,
                format!("expected {} embeddings, got {}", texts.len(), reply.data.len()),
                false,
            ));
        }
        let mut data = reply.data;
        data.sort_by_key(|item| item.index);
        Ok(data.into_iter().map(|item| item.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.output_dimensions.unwrap_or(NATIVE_DIMENSIONS)
    }
}

/// Answers from the OpenAI chat completions API, one user message per prompt.
pub struct OpenAIClient {
    endpoint: Endpoint,
    model: String,
}

fn llm_error(message: String) -> RagError {
    RagError::llm(PROVIDER, message, false)
}

impl OpenAIClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let endpoint = Endpoint::new(api_key.into(), llm_error)?;
        Ok(Self { endpoint, model: DEFAULT_CHAT_MODEL.into() })
    }

    /// Read the key from `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let endpoint = Endpoint::from_env(llm_error)?;
        Ok(Self { endpoint, model: DEFAULT_CHAT_MODEL.into() })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.endpoint.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(provider = PROVIDER, model = %self.model, prompt_len = prompt.len(), "generating");

        let body = CompletionBody {
            model: &self.model,
            messages: [Message { role: "user", content: prompt }],
        };
        let reply: CompletionReply = self
            .endpoint
            .post("chat/completions", &body)
            .await
            .map_err(|(message, transient)| {
                error!(provider = PROVIDER, error = %message, "completion request failed");
                RagError::llm(PROVIDER, message, transient)
            })?;

        reply
            .text()
            .ok_or_else(|| RagError::llm(PROVIDER, "response contained no message content", false))
    }
}
