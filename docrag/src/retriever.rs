//! Query embedding and similarity search.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{RagConfig, ServiceTimeouts};
use crate::document::RetrievalResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::retry::with_timeout;
use crate::similarity::rank;
use crate::vectorstore::VectorIndex;

/// Finds the chunks most similar to a free-text query.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    index_name: String,
    top_k: usize,
    similarity_threshold: f32,
    timeouts: ServiceTimeouts,
}

impl Retriever {
    /// Create a retriever over the index named in `config`.
    ///
    /// `embedder` must produce vectors comparable to the ones the index was
    /// built with: the same provider, or the same model tuned for queries.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        config: &RagConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            index_name: config.index_name.clone(),
            top_k: config.top_k,
            similarity_threshold: config.similarity_threshold,
            timeouts: config.timeouts,
        }
    }

    /// The configured default result count.
    pub fn default_top_k(&self) -> usize {
        self.top_k
    }

    /// Retrieve with the configured `top_k`.
    pub async fn retrieve_default(&self, query: &str) -> Result<RetrievalResult> {
        self.retrieve(query, self.top_k).await
    }

    /// Return up to `top_k` chunks ranked by descending similarity to `query`.
    ///
    /// Matches scoring below the configured similarity threshold are dropped;
    /// if none remain the result is empty rather than an error.
    ///
    /// # Errors
    ///
    /// - [`RagError::ConfigError`] if `top_k == 0`
    /// - [`RagError::RetrievalError`] if the query is blank or the index is
    ///   missing, empty or unreachable
    /// - [`RagError::IndexConfigMismatch`] if the query embedding does not
    ///   match the index dimensionality
    /// - [`RagError::EmbeddingServiceError`] if embedding the query fails or
    ///   times out (never retried)
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<RetrievalResult> {
        if top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if query.trim().is_empty() {
            return Err(RagError::RetrievalError("query must not be empty".to_string()));
        }

        let info = with_timeout(
            "describe index",
            self.timeouts.index,
            self.index.describe_index(&self.index_name),
        )
        .await
        .map_err(|e| self.unreachable(e))?
        .ok_or_else(|| {
            RagError::RetrievalError(format!("index '{}' does not exist", self.index_name))
        })?;
        if info.record_count == 0 {
            return Err(RagError::RetrievalError(format!("index '{}' is empty", self.index_name)));
        }

        let vector = with_timeout("embedding", self.timeouts.embedding, self.embedder.embed(query))
            .await
            .map_err(|e| e.timeout_as(|m| RagError::embedding(self.embedder.name(), m, true)))?;
        if vector.len() != info.dimensions {
            return Err(RagError::IndexConfigMismatch {
                index: self.index_name.clone(),
                expected: format!("{} dimensions", info.dimensions),
                actual: format!(
                    "{}-dimensional query embedding from '{}'",
                    vector.len(),
                    self.embedder.name()
                ),
            });
        }

        let mut chunks = with_timeout(
            "search",
            self.timeouts.index,
            self.index.search(&self.index_name, &vector, top_k),
        )
        .await
        .map_err(|e| self.unreachable(e))?;
        let candidates = chunks.len();

        rank(&mut chunks, top_k);
        let threshold = self.similarity_threshold;
        chunks.retain(|c| c.score >= threshold);

        debug!(candidates, threshold, "filtered search results");
        info!(index = %self.index_name, top_k, result_count = chunks.len(), "retrieval completed");

        Ok(RetrievalResult { query: query.to_string(), chunks })
    }

    fn unreachable(&self, e: RagError) -> RagError {
        RagError::RetrievalError(format!("index '{}' unavailable: {e}", self.index_name))
    }
}
