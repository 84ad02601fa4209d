//! Error types for the `docrag` crate.

use std::collections::BTreeSet;
use std::time::Duration;

use thiserror::Error;

use crate::document::ScoredChunk;

/// Everything needed to (re)run one generation without re-running retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationContext {
    /// The question being answered.
    pub query: String,
    /// Ids of every retrieved chunk. Together with `query` this is the
    /// response cache key.
    pub retrieved: BTreeSet<String>,
    /// The fully assembled prompt that was sent to the LLM.
    pub prompt: String,
    /// The chunks whose text is in the prompt, in rank order.
    pub sources: Vec<ScoredChunk>,
}

/// Errors that can occur in RAG operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// The document format is not handled by any configured loader.
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// The document could not be read or its text could not be extracted.
    #[error("Failed to parse document '{source_name}': {message}")]
    ParseError {
        /// Path or name of the offending document.
        source_name: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding service error ({provider}): {message}")]
    EmbeddingServiceError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
        /// Whether retrying the request may succeed.
        transient: bool,
    },

    /// An existing index is incompatible with the expected configuration.
    #[error("Index '{index}' config mismatch: expected {expected}, found {actual}")]
    IndexConfigMismatch {
        /// The index name.
        index: String,
        /// The expected configuration value.
        expected: String,
        /// The value actually found.
        actual: String,
    },

    /// The vector index could not be searched.
    #[error("Retrieval error: {0}")]
    RetrievalError(String),

    /// A single LLM request failed.
    #[error("LLM service error ({provider}): {message}")]
    LlmServiceError {
        /// The LLM provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
        /// Whether retrying the request may succeed.
        transient: bool,
    },

    /// The LLM failed to produce an answer after all retries.
    #[error("Generation error: {message}")]
    GenerationError {
        /// A description of the failure.
        message: String,
        /// The prompt and sources, preserved for a later retry.
        context: Box<GenerationContext>,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
        /// Whether retrying the request may succeed.
        transient: bool,
    },

    /// An external call did not complete within its configured timeout.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The configured timeout.
        after: Duration,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error in the RAG pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl RagError {
    /// Whether the failed operation may succeed if retried.
    ///
    /// Timeouts and errors flagged transient by their backend (transport
    /// failures, rate limiting, 5xx responses) are retryable. Format,
    /// parse and configuration errors never are.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::EmbeddingServiceError { transient, .. }
            | Self::LlmServiceError { transient, .. }
            | Self::VectorStoreError { transient, .. } => *transient,
            _ => false,
        }
    }

    /// Report a [`RagError::Timeout`] as `stage` would, leaving other errors as they are.
    pub(crate) fn timeout_as(self, stage: impl FnOnce(String) -> Self) -> Self {
        match self {
            timeout @ Self::Timeout { .. } => stage(timeout.to_string()),
            other => other,
        }
    }

    pub(crate) fn llm(provider: &str, message: impl Into<String>, transient: bool) -> Self {
        Self::LlmServiceError { provider: provider.to_string(), message: message.into(), transient }
    }

    pub(crate) fn embedding(provider: &str, message: impl Into<String>, transient: bool) -> Self {
        Self::EmbeddingServiceError {
            provider: provider.to_string(),
            message: message.into(),
            transient,
        }
    }

    pub(crate) fn vector_store(backend: &str, message: impl Into<String>, transient: bool) -> Self {
        Self::VectorStoreError {
            backend: backend.to_string(),
            message: message.into(),
            transient,
        }
    }

    pub(crate) fn parse(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseError { source_name: source_name.into(), message: message.into() }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
