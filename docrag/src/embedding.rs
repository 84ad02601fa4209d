//! Text to vector conversion.

use async_trait::async_trait;

use crate::error::Result;

/// Turns text into fixed-width vectors.
///
/// Ingestion and queries must use the same provider so that stored and
/// query vectors are comparable.
///
/// Errors should be reported as
/// [`RagError::EmbeddingServiceError`](crate::RagError::EmbeddingServiceError)
/// with `transient` set for transport failures, rate limiting and 5xx
/// responses, so that callers know what to retry.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving order.
    ///
    /// Falls back to one [`embed`](EmbeddingProvider::embed) call per text.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Width of every vector this provider returns.
    fn dimensions(&self) -> usize;
}
