//! Configuration for the RAG pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::retry::RetryPolicy;
use crate::similarity::DistanceMetric;

/// Per-service timeouts applied to every external call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ServiceTimeouts {
    /// Timeout for a single embedding request.
    pub embedding: Duration,
    /// Timeout for a single vector index request (describe, create, upsert, search).
    pub index: Duration,
    /// Timeout for a single LLM generation request.
    pub generation: Duration,
}

impl Default for ServiceTimeouts {
    fn default() -> Self {
        Self {
            embedding: Duration::from_secs(30),
            index: Duration::from_secs(30),
            generation: Duration::from_secs(120),
        }
    }
}

/// Configuration parameters for the RAG pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Name of the vector index holding the embedding records.
    pub index_name: String,
    /// Dimensionality of the embedding vectors stored in the index.
    pub embedding_dimensions: usize,
    /// Similarity function the index is configured with.
    pub distance_metric: DistanceMetric,
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of top results to return from vector search.
    pub top_k: usize,
    /// Minimum similarity score for results (results below this are filtered out).
    pub similarity_threshold: f32,
    /// Upper bound on the number of context characters placed into a prompt.
    pub max_context_chars: usize,
    /// Maximum number of chunks embedded and upserted concurrently during ingestion.
    pub ingest_concurrency: usize,
    /// Maximum number of cached answers. Zero disables the response cache.
    pub cache_capacity: usize,
    /// Optional lifetime of a cached answer.
    pub cache_ttl: Option<Duration>,
    /// Timeouts for external calls.
    pub timeouts: ServiceTimeouts,
    /// Retry policy for transient embedding and generation failures.
    pub retry: RetryPolicy,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            index_name: "vector_index".to_string(),
            embedding_dimensions: 768,
            distance_metric: DistanceMetric::Cosine,
            chunk_size: 400,
            chunk_overlap: 20,
            top_k: 5,
            similarity_threshold: 0.0,
            max_context_chars: 8_000,
            ingest_concurrency: 4,
            cache_capacity: 256,
            cache_ttl: None,
            timeouts: ServiceTimeouts::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `index_name` is empty
    /// - `embedding_dimensions == 0`
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `similarity_threshold` is not finite
    /// - `max_context_chars == 0` or `ingest_concurrency == 0`
    pub fn validate(&self) -> Result<()> {
        if self.index_name.trim().is_empty() {
            return Err(RagError::ConfigError("index_name must not be empty".to_string()));
        }
        if self.embedding_dimensions == 0 {
            return Err(RagError::ConfigError(
                "embedding_dimensions must be greater than zero".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if !self.similarity_threshold.is_finite() {
            return Err(RagError::ConfigError("similarity_threshold must be finite".to_string()));
        }
        if self.max_context_chars == 0 {
            return Err(RagError::ConfigError(
                "max_context_chars must be greater than zero".to_string(),
            ));
        }
        if self.ingest_concurrency == 0 {
            return Err(RagError::ConfigError(
                "ingest_concurrency must be greater than zero".to_string(),
            ));
        }
        self.retry.validate()
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the vector index name.
    pub fn index_name(mut self, name: impl Into<String>) -> Self {
        self.config.index_name = name.into();
        self
    }

    /// Set the embedding dimensionality expected by the index.
    pub fn embedding_dimensions(mut self, dimensions: usize) -> Self {
        self.config.embedding_dimensions = dimensions;
        self
    }

    /// Set the similarity function used by the index.
    pub fn distance_metric(mut self, metric: DistanceMetric) -> Self {
        self.config.distance_metric = metric;
        self
    }

    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of top results to return from vector search.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum similarity threshold for filtering results.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    /// Set the prompt context budget in characters.
    pub fn max_context_chars(mut self, chars: usize) -> Self {
        self.config.max_context_chars = chars;
        self
    }

    /// Set the number of chunks processed concurrently during ingestion.
    pub fn ingest_concurrency(mut self, workers: usize) -> Self {
        self.config.ingest_concurrency = workers;
        self
    }

    /// Set the response cache capacity. Zero disables caching.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    /// Expire cached answers after `ttl`.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl = Some(ttl);
        self
    }

    /// Set the external call timeouts.
    pub fn timeouts(mut self, timeouts: ServiceTimeouts) -> Self {
        self.config.timeouts = timeouts;
        self
    }

    /// Set the retry policy for transient failures.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
