//! # docrag
//!
//! Retrieval-Augmented Generation over PDF and text documents.
//!
//! ## Overview
//!
//! Documents are loaded, split into overlapping chunks, embedded and stored
//! in a vector index. Questions are embedded with the same provider, the most
//! similar chunks are retrieved, and an LLM answers from those chunks only.
//!
//! - [`DocumentLoader`] / [`CompositeLoader`] - text, markdown and (with the
//!   `pdf` feature) PDF extraction
//! - [`Chunker`] - [`FixedSizeChunker`] and [`SeparatorChunker`]
//! - [`Indexer`] - index lifecycle and concurrent chunk ingestion
//! - [`Retriever`] - top-k similarity search with a score threshold
//! - [`Responder`] - bounded prompt assembly, generation and answer caching
//! - [`RagPipeline`] - all of the above behind one builder
//!
//! ## Backends
//!
//! | Feature  | Provides |
//! |----------|----------|
//! | `gemini` | [`gemini::GeminiEmbeddingProvider`], [`gemini::GeminiClient`] |
//! | `openai` | [`openai::OpenAIEmbeddingProvider`], [`openai::OpenAIClient`] |
//! | `qdrant` | [`qdrant::QdrantVectorIndex`] |
//! | `pdf`    | [`pdf::PdfLoader`] |
//!
//! [`InMemoryVectorIndex`] is always available.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use docrag::gemini::{GeminiClient, GeminiEmbeddingProvider};
//! use docrag::{InMemoryVectorIndex, RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(GeminiEmbeddingProvider::from_env()?))
//!     .vector_index(Arc::new(InMemoryVectorIndex::new()))
//!     .llm(Arc::new(GeminiClient::from_env()?))
//!     .build()?;
//!
//! pipeline.create_or_verify_index().await?;
//! pipeline.ingest_path(Path::new("annual_report.pdf")).await?;
//! let answer = pipeline.ask("What was the net profit?").await?;
//! println!("{}", answer.text);
//! ```

pub mod cache;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(any(feature = "gemini", feature = "openai"))]
mod http;
pub mod indexer;
pub mod inmemory;
pub mod llm;
pub mod loader;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "pdf")]
pub mod pdf;
pub mod pipeline;
pub mod prompt;
#[cfg(feature = "qdrant")]
pub mod qdrant;
pub mod responder;
pub mod retriever;
pub mod retry;
pub mod similarity;
pub mod vectorstore;

pub use cache::{CacheKey, CacheStats, ResponseCache};
pub use chunking::{Chunker, DEFAULT_SEPARATORS, FixedSizeChunker, SeparatorChunker};
pub use config::{RagConfig, RagConfigBuilder, ServiceTimeouts};
pub use document::{
    Answer, Chunk, Document, DocumentFormat, DocumentMetadata, EmbeddingRecord, RetrievalResult,
    ScoredChunk, reconstruct,
};
pub use embedding::EmbeddingProvider;
pub use error::{GenerationContext, RagError, Result};
pub use indexer::{ChunkFailure, Indexer, IngestReport};
pub use inmemory::InMemoryVectorIndex;
pub use llm::LlmClient;
pub use loader::{CompositeLoader, DocumentLoader, TextLoader, detect_format, document_id};
#[cfg(feature = "pdf")]
pub use pdf::PdfLoader;
pub use pipeline::{RagPipeline, RagPipelineBuilder};
pub use prompt::build_prompt;
pub use responder::{INSUFFICIENT_CONTEXT_ANSWER, Responder};
pub use retriever::Retriever;
pub use retry::{RetryPolicy, with_retry, with_timeout};
pub use similarity::{DistanceMetric, cosine_similarity, dot_product};
pub use vectorstore::{IndexInfo, IndexSpec, VectorIndex};
