//! Qdrant vector index backend.
//!
//! Provides [`QdrantVectorIndex`] which implements [`VectorIndex`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//!
//! Qdrant only accepts UUIDs or integers as point ids, so each chunk id is
//! mapped to a name-based UUID and the original id is kept in the payload.
//!
//! # Example
//!
//! ```rust,ignore
//! use docrag::qdrant::QdrantVectorIndex;
//!
//! let index = QdrantVectorIndex::new("http://localhost:6334", None)?;
//! index.create_index(&IndexSpec::new("docs", 768, DistanceMetric::Cosine)).await?;
//! index.upsert("docs", &records).await?;
//! let results = index.search("docs", &query_embedding, 5).await?;
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config;
use qdrant_client::qdrant::{
    CollectionStatus, Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    PointId, PointStruct, PointsIdsList, ScrollPointsBuilder, SearchPointsBuilder,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant, QdrantError};
use tracing::debug;
use uuid::Uuid;

use crate::document::{EmbeddingRecord, ScoredChunk};
use crate::error::{RagError, Result};
use crate::similarity::{DistanceMetric, rank};
use crate::vectorstore::{IndexInfo, IndexSpec, VectorIndex};

const BACKEND: &str = "qdrant";

/// The default Qdrant gRPC endpoint.
pub const DEFAULT_URL: &str = "http://localhost:6334";

// gRPC status codes worth retrying: DEADLINE_EXCEEDED, RESOURCE_EXHAUSTED,
// ABORTED, UNAVAILABLE.
const TRANSIENT_CODES: [i32; 4] = [4, 8, 10, 14];

const SCROLL_PAGE: u32 = 256;

/// A [`VectorIndex`] backed by [Qdrant](https://qdrant.tech/).
///
/// Indexes map to Qdrant collections. Record text, document id and metadata
/// are stored as point payload.
pub struct QdrantVectorIndex {
    client: Qdrant,
}

impl QdrantVectorIndex {
    /// Connect to the Qdrant instance at `url`.
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self> {
        let client = Qdrant::from_url(url).api_key(api_key).build().map_err(map_err)?;
        Ok(Self { client })
    }

    /// Connect to `http://localhost:6334` without authentication.
    pub fn default_url() -> Result<Self> {
        Self::new(DEFAULT_URL, None)
    }

    /// Wrap an existing client.
    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }
}

fn map_err(e: QdrantError) -> RagError {
    let transient = match &e {
        QdrantError::ResponseError { status } => TRANSIENT_CODES.contains(&(status.code() as i32)),
        _ => false,
    };
    RagError::vector_store(BACKEND, e.to_string(), transient)
}

/// The point id a chunk id is stored under.
pub fn point_id(record_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, record_id.as_bytes()).to_string()
}

fn distance(metric: DistanceMetric) -> Distance {
    match metric {
        DistanceMetric::Cosine => Distance::Cosine,
        DistanceMetric::DotProduct => Distance::Dot,
    }
}

fn metric(distance: i32) -> Option<DistanceMetric> {
    match Distance::try_from(distance).ok()? {
        Distance::Cosine => Some(DistanceMetric::Cosine),
        Distance::Dot => Some(DistanceMetric::DotProduct),
        _ => None,
    }
}

fn extract_string(value: &QdrantValue) -> Option<String> {
    match &value.kind {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

fn payload(record: &EmbeddingRecord) -> Result<Payload> {
    let metadata: serde_json::Map<String, serde_json::Value> = record
        .metadata
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
        .collect();
    let value = serde_json::json!({
        "chunk_id": record.id,
        "document_id": record.document_id,
        "text": record.text,
        "metadata": metadata,
    });
    Payload::try_from(value)
        .map_err(|e| RagError::vector_store(BACKEND, format!("invalid payload: {e}"), false))
}

fn record_from_payload(payload: &HashMap<String, QdrantValue>) -> EmbeddingRecord {
    let field = |name: &str| payload.get(name).and_then(extract_string).unwrap_or_default();
    let metadata: HashMap<String, String> = payload
        .get("metadata")
        .and_then(|v| match &v.kind {
            Some(Kind::StructValue(s)) => Some(
                s.fields
                    .iter()
                    .filter_map(|(k, v)| extract_string(v).map(|s| (k.clone(), s)))
                    .collect(),
            ),
            _ => None,
        })
        .unwrap_or_default();

    EmbeddingRecord {
        id: field("chunk_id"),
        document_id: field("document_id"),
        vector: Vec::new(),
        text: field("text"),
        metadata,
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn describe_index(&self, name: &str) -> Result<Option<IndexInfo>> {
        if !self.client.collection_exists(name).await.map_err(map_err)? {
            return Ok(None);
        }
        let response = self.client.collection_info(name).await.map_err(map_err)?;
        let info = response.result.ok_or_else(|| {
            RagError::vector_store(BACKEND, format!("no info returned for '{name}'"), true)
        })?;

        let params = info
            .config
            .as_ref()
            .and_then(|c| c.params.as_ref())
            .and_then(|p| p.vectors_config.as_ref())
            .and_then(|v| match &v.config {
                Some(Config::Params(params)) => Some(params),
                _ => None,
            })
            .ok_or_else(|| {
                RagError::vector_store(
                    BACKEND,
                    format!("collection '{name}' does not use a single unnamed vector"),
                    false,
                )
            })?;
        let metric = metric(params.distance).ok_or_else(|| {
            RagError::vector_store(
                BACKEND,
                format!("collection '{name}' uses an unsupported distance"),
                false,
            )
        })?;

        let ready = info.status == CollectionStatus::Green as i32
            || info.status == CollectionStatus::Yellow as i32;
        Ok(Some(IndexInfo {
            name: name.to_string(),
            dimensions: params.size as usize,
            metric,
            record_count: info.points_count.unwrap_or_default() as usize,
            ready,
        }))
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        self.client
            .create_collection(CreateCollectionBuilder::new(spec.name.as_str()).vectors_config(
                VectorParamsBuilder::new(spec.dimensions as u64, distance(spec.metric)),
            ))
            .await
            .map_err(map_err)?;

        debug!(collection = %spec.name, dimensions = spec.dimensions, "created qdrant collection");
        Ok(())
    }

    async fn upsert(&self, index: &str, records: &[EmbeddingRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let points = records
            .iter()
            .map(|record| {
                Ok(PointStruct::new(point_id(&record.id), record.vector.clone(), payload(record)?))
            })
            .collect::<Result<Vec<_>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(index, points).wait(true))
            .await
            .map_err(map_err)?;

        debug!(collection = index, count = records.len(), "upserted records to qdrant");
        Ok(())
    }

    async fn delete(&self, index: &str, ids: &[&str]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let point_ids: Vec<PointId> = ids.iter().map(|id| point_id(id).into()).collect();
        self.client
            .delete_points(
                DeletePointsBuilder::new(index).points(PointsIdsList { ids: point_ids }).wait(true),
            )
            .await
            .map_err(map_err)?;

        debug!(collection = index, count = ids.len(), "deleted points from qdrant");
        Ok(())
    }

    async fn record_ids(&self, index: &str, document_id: &str) -> Result<Vec<String>> {
        let filter = Filter::must([Condition::matches("document_id", document_id.to_string())]);
        let mut ids = Vec::new();
        let mut offset: Option<PointId> = None;
        loop {
            let mut request = ScrollPointsBuilder::new(index)
                .filter(filter.clone())
                .with_payload(true)
                .limit(SCROLL_PAGE);
            if let Some(offset) = offset.take() {
                request = request.offset(offset);
            }
            let page = self.client.scroll(request).await.map_err(map_err)?;
            ids.extend(
                page.result
                    .iter()
                    .filter_map(|point| point.payload.get("chunk_id").and_then(extract_string)),
            );
            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn search(&self, index: &str, vector: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(index, vector.to_vec(), top_k as u64).with_payload(true),
            )
            .await
            .map_err(map_err)?;

        let mut results: Vec<ScoredChunk> = response
            .result
            .into_iter()
            .map(|scored| ScoredChunk {
                record: record_from_payload(&scored.payload),
                score: scored.score,
            })
            .collect();

        // Qdrant does not order equal scores deterministically.
        rank(&mut results, top_k);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_are_stable_uuids() {
        let id = point_id("report_pdf_0");
        assert_eq!(id, point_id("report_pdf_0"));
        assert_ne!(id, point_id("report_pdf_1"));
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn maps_metrics_both_ways() {
        for m in [DistanceMetric::Cosine, DistanceMetric::DotProduct] {
            assert_eq!(metric(distance(m) as i32), Some(m));
        }
        assert_eq!(metric(Distance::Euclid as i32), None);
    }

    #[test]
    fn restores_record_from_payload() {
        let record = EmbeddingRecord::new("doc_0", "doc", vec![0.1], "hello");
        assert!(payload(&record).is_ok());

        let stored: HashMap<String, QdrantValue> = HashMap::from([
            ("chunk_id".to_string(), QdrantValue::from("doc_0")),
            ("document_id".to_string(), QdrantValue::from("doc")),
            ("text".to_string(), QdrantValue::from("hello")),
        ]);
        let restored = record_from_payload(&stored);
        assert_eq!(restored.id, "doc_0");
        assert_eq!(restored.document_id, "doc");
        assert_eq!(restored.text, "hello");
        assert!(restored.metadata.is_empty());
    }
}
