//! LLM client trait for answer generation.

use async_trait::async_trait;

use crate::error::Result;

/// A text-generation service.
///
/// Backends report failures as
/// [`RagError::LlmServiceError`](crate::RagError::LlmServiceError), flagging
/// transport failures, rate limiting and 5xx responses as transient. The
/// [`Responder`](crate::Responder) retries those and surfaces the final
/// failure as a [`RagError::GenerationError`](crate::RagError::GenerationError).
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Model or provider name used in logs.
    fn name(&self) -> &str;

    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;
}
