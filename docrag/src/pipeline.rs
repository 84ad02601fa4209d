//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] wires a [`DocumentLoader`], a [`Chunker`], an
//! [`Indexer`], a [`Retriever`] and a [`Responder`] around one shared
//! embedding provider and vector index.
//!
//! # Example
//!
//! ```rust,ignore
//! use docrag::{RagPipeline, RagConfig, InMemoryVectorIndex};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .vector_index(Arc::new(InMemoryVectorIndex::new()))
//!     .llm(Arc::new(my_llm))
//!     .build()?;
//!
//! pipeline.create_or_verify_index().await?;
//! let report = pipeline.ingest_path(Path::new("report.pdf")).await?;
//! let answer = pipeline.ask("What was the net profit?").await?;
//! ```

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::cache::CacheStats;
use crate::chunking::{Chunker, SeparatorChunker};
use crate::config::RagConfig;
use crate::document::{Answer, Document, RetrievalResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{GenerationContext, RagError, Result};
use crate::indexer::{Indexer, IngestReport};
use crate::llm::LlmClient;
use crate::loader::{CompositeLoader, DocumentLoader};
use crate::responder::Responder;
use crate::retriever::Retriever;
use crate::vectorstore::{IndexInfo, VectorIndex};

/// The RAG pipeline orchestrator.
///
/// Ingestion runs load → chunk → embed → upsert; questions run
/// embed → search → prompt → generate. Construct one via
/// [`RagPipeline::builder()`] and share it across requests.
pub struct RagPipeline {
    config: RagConfig,
    loader: Arc<dyn DocumentLoader>,
    chunker: Arc<dyn Chunker>,
    indexer: Indexer,
    retriever: Retriever,
    responder: Responder,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// The indexer, for direct chunk-level operations.
    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    /// The retriever, for retrieval without generation.
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// The responder, for generation over an existing retrieval.
    pub fn responder(&self) -> &Responder {
        &self.responder
    }

    /// Ensure the configured index exists and matches the configuration.
    ///
    /// See [`Indexer::create_or_verify_index`].
    pub async fn create_or_verify_index(&self) -> Result<IndexInfo> {
        self.indexer.create_or_verify_index().await
    }

    /// Load, chunk and index the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns loader errors ([`RagError::UnsupportedFormat`],
    /// [`RagError::ParseError`]). Per-chunk indexing failures are reported
    /// in the returned [`IngestReport`] instead.
    pub async fn ingest_path(&self, path: &Path) -> Result<IngestReport> {
        let document = self.loader.load_path(path).await.map_err(|e| {
            error!(path = %path.display(), error = %e, "failed to load document");
            e
        })?;
        Ok(self.ingest_document(&document).await)
    }

    /// Load, chunk and index an in-memory file. `name` selects the format.
    pub async fn ingest_bytes(&self, name: &str, bytes: &[u8]) -> Result<IngestReport> {
        let document = self.loader.load_bytes(name, bytes).await?;
        Ok(self.ingest_document(&document).await)
    }

    /// Chunk and index an already loaded document.
    ///
    /// Records of an earlier version of the document that the new chunking
    /// no longer produces are deleted afterwards. Cached answers are dropped
    /// whenever the index content changed.
    pub async fn ingest_document(&self, document: &Document) -> IngestReport {
        let chunks = self.chunker.chunk(document);
        let keep: BTreeSet<String> = chunks.iter().map(|c| c.id.clone()).collect();

        let mut report = if chunks.is_empty() {
            info!(document.id = %document.id, chunk_count = 0, "ingested document (empty)");
            IngestReport {
                document_id: document.id.clone(),
                completed_at: chrono::Utc::now(),
                ..IngestReport::default()
            }
        } else {
            self.indexer.index_chunks(&document.id, chunks).await
        };

        match self.indexer.prune_document(&document.id, &keep).await {
            Ok(removed) => report.stale_removed = removed,
            Err(e) => {
                warn!(document.id = %document.id, error = %e, "failed to remove stale records");
            }
        }
        if !report.succeeded.is_empty() || report.stale_removed > 0 {
            self.responder.clear_cache().await;
        }
        report
    }

    /// Retrieve the configured `top_k` chunks for `query`.
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalResult> {
        self.retriever.retrieve(query, self.config.top_k).await
    }

    /// Answer `query` using the configured `top_k`.
    pub async fn ask(&self, query: &str) -> Result<Answer> {
        self.ask_with_top_k(query, self.config.top_k).await
    }

    /// Answer `query` grounded on at most `top_k` retrieved chunks.
    ///
    /// # Errors
    ///
    /// Retrieval errors, or [`RagError::GenerationError`] carrying the
    /// prompt and sources for a later [`retry_generation`](Self::retry_generation).
    pub async fn ask_with_top_k(&self, query: &str, top_k: usize) -> Result<Answer> {
        let retrieval = self.retriever.retrieve(query, top_k).await?;
        self.responder.respond(query, &retrieval).await
    }

    /// Re-run generation from the context of a failed request.
    pub async fn retry_generation(&self, context: GenerationContext) -> Result<Answer> {
        self.responder.generate_from_context(context).await
    }

    /// Delete records by chunk id and drop cached answers.
    pub async fn delete_records(&self, ids: &[&str]) -> Result<()> {
        self.indexer.delete_records(ids).await?;
        self.responder.clear_cache().await;
        Ok(())
    }

    /// Delete every chunk of `document_id` and drop cached answers.
    ///
    /// Returns the number of records removed.
    pub async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let removed = self.indexer.delete_document(document_id).await?;
        self.responder.clear_cache().await;
        Ok(removed)
    }

    /// Response cache counters.
    pub async fn cache_stats(&self) -> CacheStats {
        self.responder.cache_stats().await
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `embedding_provider`, `vector_index` and `llm` are required. The config
/// defaults to [`RagConfig::default()`], the loader to
/// [`CompositeLoader::default()`] and the chunker to a [`SeparatorChunker`]
/// sized from the config. Queries are embedded with the embedding provider
/// unless a separate query provider is set.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    query_embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_index: Option<Arc<dyn VectorIndex>>,
    llm: Option<Arc<dyn LlmClient>>,
    loader: Option<Arc<dyn DocumentLoader>>,
    chunker: Option<Arc<dyn Chunker>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider used for both ingestion and queries.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Embed queries with a different provider than documents, e.g. the
    /// same model configured for query-side retrieval. It must produce
    /// vectors of the same width.
    pub fn query_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.query_embedding_provider = Some(provider);
        self
    }

    /// Set the vector index backend.
    pub fn vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.vector_index = Some(index);
        self
    }

    /// Set the LLM used for answer generation.
    pub fn llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Set the document loader.
    pub fn loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Build the [`RagPipeline`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required component is missing,
    /// the configuration is invalid, or the query provider's dimensions
    /// differ from the embedding provider's.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let vector_index = self
            .vector_index
            .ok_or_else(|| RagError::ConfigError("vector_index is required".to_string()))?;
        let query_embedding_provider =
            self.query_embedding_provider.unwrap_or_else(|| embedding_provider.clone());
        if query_embedding_provider.dimensions() != embedding_provider.dimensions() {
            return Err(RagError::ConfigError(format!(
                "query embedding provider '{}' produces {} dimensions, '{}' produces {}",
                query_embedding_provider.name(),
                query_embedding_provider.dimensions(),
                embedding_provider.name(),
                embedding_provider.dimensions()
            )));
        }
        let llm = self.llm.ok_or_else(|| RagError::ConfigError("llm is required".to_string()))?;
        let loader = self.loader.unwrap_or_else(|| Arc::new(CompositeLoader::default()));
        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(SeparatorChunker::new(config.chunk_size, config.chunk_overlap)?),
        };

        Ok(RagPipeline {
            indexer: Indexer::new(embedding_provider, vector_index.clone(), &config),
            retriever: Retriever::new(query_embedding_provider, vector_index, &config),
            responder: Responder::new(llm, &config),
            loader,
            chunker,
            config,
        })
    }
}
