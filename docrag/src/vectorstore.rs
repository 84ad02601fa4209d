//! Vector index trait for storing and searching embedding records.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{EmbeddingRecord, ScoredChunk};
use crate::error::Result;
use crate::similarity::DistanceMetric;

/// The expected shape of an index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexSpec {
    /// Index name.
    pub name: String,
    /// Vector dimensionality. Constant for every record in the index.
    pub dimensions: usize,
    /// Similarity function used for search.
    pub metric: DistanceMetric,
}

impl IndexSpec {
    /// Create a new index spec.
    pub fn new(name: impl Into<String>, dimensions: usize, metric: DistanceMetric) -> Self {
        Self { name: name.into(), dimensions, metric }
    }
}

/// What a backend reports about an existing index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,
    /// Vector dimensionality.
    pub dimensions: usize,
    /// Similarity function used for search.
    pub metric: DistanceMetric,
    /// Number of stored records.
    pub record_count: usize,
    /// Whether the index accepts queries yet.
    pub ready: bool,
}

/// A storage backend for embedding records with similarity search.
///
/// The index is an external collaborator; implementations translate these
/// calls to the backend's own protocol. Errors should be reported as
/// [`RagError::VectorStoreError`](crate::RagError::VectorStoreError).
///
/// # Example
///
/// ```rust,ignore
/// use docrag::{DistanceMetric, IndexSpec, InMemoryVectorIndex, VectorIndex};
///
/// let index = InMemoryVectorIndex::new();
/// index.create_index(&IndexSpec::new("docs", 768, DistanceMetric::Cosine)).await?;
/// index.upsert("docs", &records).await?;
/// let results = index.search("docs", &query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Short backend name used in logs and errors.
    fn backend(&self) -> &str;

    /// Describe the named index, or `None` if it does not exist.
    async fn describe_index(&self, name: &str) -> Result<Option<IndexInfo>>;

    /// Create the named index. Callers check existence first.
    async fn create_index(&self, spec: &IndexSpec) -> Result<()>;

    /// Insert or replace records by id.
    async fn upsert(&self, index: &str, records: &[EmbeddingRecord]) -> Result<()>;

    /// Delete records by id. Unknown ids are ignored.
    async fn delete(&self, index: &str, ids: &[&str]) -> Result<()>;

    /// Ids of every record belonging to `document_id`, in ascending order.
    async fn record_ids(&self, index: &str, document_id: &str) -> Result<Vec<String>>;

    /// Search for the `top_k` records most similar to `vector`.
    ///
    /// Returns results ordered by descending similarity score, equal scores
    /// ordered by ascending record id.
    async fn search(&self, index: &str, vector: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>>;
}
