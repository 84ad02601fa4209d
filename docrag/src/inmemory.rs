//! In-memory vector index.
//!
//! This module provides [`InMemoryVectorIndex`], a zero-dependency vector index
//! backed by a `HashMap` protected by a `tokio::sync::RwLock`. It is suitable
//! for development, testing, and single-process use.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{EmbeddingRecord, ScoredChunk};
use crate::error::{RagError, Result};
use crate::similarity::rank;
use crate::vectorstore::{IndexInfo, IndexSpec, VectorIndex};

const BACKEND: &str = "InMemory";

#[derive(Debug)]
struct StoredIndex {
    spec: IndexSpec,
    records: HashMap<String, EmbeddingRecord>,
}

/// An in-memory vector index using brute-force similarity search.
///
/// Indexes are stored as nested `HashMap`s: index name → record ID → record.
/// All operations are async-safe via `tokio::sync::RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    indexes: RwLock<HashMap<String, StoredIndex>>,
}

impl InMemoryVectorIndex {
    /// Create a new empty in-memory vector index.
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(index: &str) -> RagError {
    RagError::vector_store(BACKEND, format!("index '{index}' does not exist"), false)
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn describe_index(&self, name: &str) -> Result<Option<IndexInfo>> {
        let indexes = self.indexes.read().await;
        Ok(indexes.get(name).map(|stored| IndexInfo {
            name: name.to_string(),
            dimensions: stored.spec.dimensions,
            metric: stored.spec.metric,
            record_count: stored.records.len(),
            ready: true,
        }))
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        let mut indexes = self.indexes.write().await;
        indexes
            .entry(spec.name.clone())
            .or_insert_with(|| StoredIndex { spec: spec.clone(), records: HashMap::new() });
        Ok(())
    }

    async fn upsert(&self, index: &str, records: &[EmbeddingRecord]) -> Result<()> {
        let mut indexes = self.indexes.write().await;
        let stored = indexes.get_mut(index).ok_or_else(|| missing(index))?;
        if let Some(bad) = records.iter().find(|r| r.vector.len() != stored.spec.dimensions) {
            return Err(RagError::vector_store(
                BACKEND,
                format!(
                    "record '{}' has {} dimensions, index '{index}' expects {}",
                    bad.id,
                    bad.vector.len(),
                    stored.spec.dimensions
                ),
                false,
            ));
        }
        for record in records {
            stored.records.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn delete(&self, index: &str, ids: &[&str]) -> Result<()> {
        let mut indexes = self.indexes.write().await;
        let stored = indexes.get_mut(index).ok_or_else(|| missing(index))?;
        for id in ids {
            stored.records.remove(*id);
        }
        Ok(())
    }

    async fn record_ids(&self, index: &str, document_id: &str) -> Result<Vec<String>> {
        let indexes = self.indexes.read().await;
        let stored = indexes.get(index).ok_or_else(|| missing(index))?;
        let mut ids: Vec<String> = stored
            .records
            .values()
            .filter(|r| r.document_id == document_id)
            .map(|r| r.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn search(&self, index: &str, vector: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        let indexes = self.indexes.read().await;
        let stored = indexes.get(index).ok_or_else(|| missing(index))?;
        let metric = stored.spec.metric;

        let mut scored: Vec<ScoredChunk> = stored
            .records
            .values()
            .map(|record| ScoredChunk {
                score: metric.score(&record.vector, vector),
                record: record.clone(),
            })
            .collect();

        rank(&mut scored, top_k);
        Ok(scored)
    }
}
