//! Embedding and upserting chunks into the vector index.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::{RagConfig, ServiceTimeouts};
use crate::document::{Chunk, EmbeddingRecord};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::retry::{RetryPolicy, with_retry, with_timeout};
use crate::vectorstore::{IndexInfo, IndexSpec, VectorIndex};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A chunk that could not be indexed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkFailure {
    /// The chunk identifier.
    pub chunk_id: String,
    /// Position of the chunk within its document.
    pub index: usize,
    /// Why indexing failed.
    pub error: String,
}

/// Per-chunk outcome of ingesting one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IngestReport {
    /// The ingested document.
    pub document_id: String,
    /// Number of chunks the document produced.
    pub total_chunks: usize,
    /// Ids of chunks that were embedded and upserted, in chunk order.
    pub succeeded: Vec<String>,
    /// Chunks that failed, in chunk order.
    pub failed: Vec<ChunkFailure>,
    /// Records left over from a previous, longer version of the document
    /// that were deleted.
    #[serde(default)]
    pub stale_removed: usize,
    /// When the last chunk finished.
    pub completed_at: DateTime<Utc>,
}

impl IngestReport {
    /// Whether every chunk was indexed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Embeds chunks and upserts them into a vector index.
///
/// Construct one per index at startup and share it; the indexer holds no
/// mutable state.
pub struct Indexer {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    spec: IndexSpec,
    timeouts: ServiceTimeouts,
    retry: RetryPolicy,
    concurrency: usize,
    ready_poll_interval: Duration,
}

impl Indexer {
    /// Create an indexer for the index described by `config`.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        config: &RagConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            spec: IndexSpec::new(
                config.index_name.clone(),
                config.embedding_dimensions,
                config.distance_metric,
            ),
            timeouts: config.timeouts,
            retry: config.retry,
            concurrency: config.ingest_concurrency.max(1),
            ready_poll_interval: READY_POLL_INTERVAL,
        }
    }

    /// Set how often [`create_or_verify_index`](Self::create_or_verify_index)
    /// polls a freshly created index for readiness.
    pub fn with_ready_poll_interval(mut self, interval: Duration) -> Self {
        self.ready_poll_interval = interval;
        self
    }

    /// The index this indexer writes to.
    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    /// Ensure the index exists with the expected dimensionality and metric.
    ///
    /// Creates the index if absent and waits until it reports ready. Calling
    /// this on an already correctly configured index changes nothing.
    ///
    /// # Errors
    ///
    /// - [`RagError::IndexConfigMismatch`] if the embedding provider or an
    ///   existing index disagrees with the configured dimensionality or metric
    /// - [`RagError::Timeout`] if the index does not become ready in time
    /// - backend errors from the vector index
    pub async fn create_or_verify_index(&self) -> Result<IndexInfo> {
        let spec = &self.spec;
        let provider_dimensions = self.embedder.dimensions();
        if provider_dimensions != spec.dimensions {
            return Err(RagError::IndexConfigMismatch {
                index: spec.name.clone(),
                expected: format!("{} dimensions", spec.dimensions),
                actual: format!(
                    "{provider_dimensions} dimensions from embedding provider '{}'",
                    self.embedder.name()
                ),
            });
        }

        match self.describe().await? {
            Some(info) => {
                verify(spec, &info)?;
                debug!(index = %spec.name, records = info.record_count, "index already exists");
                if info.ready {
                    return Ok(info);
                }
            }
            None => {
                info!(
                    index = %spec.name,
                    dimensions = spec.dimensions,
                    metric = %spec.metric,
                    "creating vector index"
                );
                with_timeout("create index", self.timeouts.index, self.index.create_index(spec))
                    .await
                    .map_err(|e| self.index_timeout(e))?;
            }
        }

        let info = self.wait_until_ready().await?;
        info!(index = %spec.name, "index is ready for querying");
        Ok(info)
    }

    async fn describe(&self) -> Result<Option<IndexInfo>> {
        with_timeout(
            "describe index",
            self.timeouts.index,
            self.index.describe_index(&self.spec.name),
        )
        .await
        .map_err(|e| self.index_timeout(e))
    }

    fn index_timeout(&self, e: RagError) -> RagError {
        e.timeout_as(|message| RagError::vector_store(self.index.backend(), message, true))
    }

    async fn wait_until_ready(&self) -> Result<IndexInfo> {
        let deadline = tokio::time::Instant::now() + self.timeouts.index;
        loop {
            if let Some(info) = self.describe().await? {
                verify(&self.spec, &info)?;
                if info.ready {
                    return Ok(info);
                }
            }
            if tokio::time::Instant::now() + self.ready_poll_interval > deadline {
                return Err(RagError::Timeout {
                    operation: format!("waiting for index '{}' to become ready", self.spec.name),
                    after: self.timeouts.index,
                });
            }
            tokio::time::sleep(self.ready_poll_interval).await;
        }
    }

    /// Embed and upsert `chunks`, at most `ingest_concurrency` at a time.
    ///
    /// Never fails as a whole: every chunk's outcome is in the report.
    pub async fn index_chunks<I>(&self, document_id: &str, chunks: I) -> IngestReport
    where
        I: IntoIterator<Item = Chunk>,
    {
        let mut outcomes: Vec<(Chunk, Result<()>)> = stream::iter(chunks)
            .map(|chunk| async move {
                let outcome = self.index_chunk(&chunk).await;
                (chunk, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        outcomes.sort_by_key(|(chunk, _)| chunk.index);

        let mut report = IngestReport {
            document_id: document_id.to_string(),
            total_chunks: outcomes.len(),
            completed_at: Utc::now(),
            ..IngestReport::default()
        };
        for (chunk, outcome) in outcomes {
            match outcome {
                Ok(()) => report.succeeded.push(chunk.id),
                Err(e) => {
                    error!(chunk.id = %chunk.id, error = %e, "failed to index chunk");
                    report.failed.push(ChunkFailure {
                        chunk_id: chunk.id,
                        index: chunk.index,
                        error: e.to_string(),
                    });
                }
            }
        }

        if report.is_complete() {
            info!(document.id = document_id, chunk_count = report.total_chunks, "indexed document");
        } else {
            warn!(
                document.id = document_id,
                succeeded = report.succeeded.len(),
                failed = report.failed.len(),
                "document partially indexed"
            );
        }
        report
    }

    async fn index_chunk(&self, chunk: &Chunk) -> Result<()> {
        let vector = self.embed(&chunk.text).await?;
        let record = EmbeddingRecord::from_chunk(chunk, vector);
        let records = std::slice::from_ref(&record);
        with_retry(&self.retry, "upsert", || self.upsert_once(records)).await?;
        debug!(chunk.id = %chunk.id, "indexed chunk");
        Ok(())
    }

    async fn upsert_once(&self, records: &[EmbeddingRecord]) -> Result<()> {
        with_timeout("upsert", self.timeouts.index, self.index.upsert(&self.spec.name, records))
            .await
            .map_err(|e| self.index_timeout(e))
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>> {
        with_timeout("embedding", self.timeouts.embedding, self.embedder.embed(text))
            .await
            .map_err(|e| e.timeout_as(|m| RagError::embedding(self.embedder.name(), m, true)))
    }

    /// Embed `text` with retries, checking the vector matches the index.
    pub(crate) async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = with_retry(&self.retry, "embed", || self.embed_once(text)).await?;
        if vector.len() != self.spec.dimensions {
            return Err(RagError::embedding(
                self.embedder.name(),
                format!(
                    "returned a {}-dimensional vector, index '{}' expects {}",
                    vector.len(),
                    self.spec.name,
                    self.spec.dimensions
                ),
                false,
            ));
        }
        Ok(vector)
    }

    /// Delete records by chunk id.
    pub async fn delete_records(&self, ids: &[&str]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        with_timeout("delete", self.timeouts.index, self.index.delete(&self.spec.name, ids))
            .await
            .map_err(|e| self.index_timeout(e))?;
        info!(index = %self.spec.name, count = ids.len(), "deleted records");
        Ok(())
    }

    /// Delete every record of `document_id`, returning how many were removed.
    pub async fn delete_document(&self, document_id: &str) -> Result<usize> {
        self.prune_document(document_id, &BTreeSet::new()).await
    }

    /// Delete the records of `document_id` whose ids are not in `keep`.
    ///
    /// Run after re-ingesting a document so chunks from a longer previous
    /// version stop matching queries. Returns how many records were removed.
    pub async fn prune_document(
        &self,
        document_id: &str,
        keep: &BTreeSet<String>,
    ) -> Result<usize> {
        let stored = with_timeout(
            "list records",
            self.timeouts.index,
            self.index.record_ids(&self.spec.name, document_id),
        )
        .await
        .map_err(|e| self.index_timeout(e))?;

        let stale: Vec<&str> =
            stored.iter().map(String::as_str).filter(|id| !keep.contains(*id)).collect();
        if !stale.is_empty() {
            debug!(document.id = document_id, count = stale.len(), "removing stale records");
            self.delete_records(&stale).await?;
        }
        Ok(stale.len())
    }
}

fn verify(spec: &IndexSpec, info: &IndexInfo) -> Result<()> {
    if info.dimensions != spec.dimensions {
        return Err(RagError::IndexConfigMismatch {
            index: spec.name.clone(),
            expected: format!("{} dimensions", spec.dimensions),
            actual: format!("{} dimensions", info.dimensions),
        });
    }
    if info.metric != spec.metric {
        return Err(RagError::IndexConfigMismatch {
            index: spec.name.clone(),
            expected: format!("{} similarity", spec.metric),
            actual: format!("{} similarity", info.metric),
        });
    }
    Ok(())
}
