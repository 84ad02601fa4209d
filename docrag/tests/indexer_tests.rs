//! Index lifecycle and ingestion tests.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{
    DIM, FlakyEmbedder, HangingEmbedder, HashEmbedder, PeakEmbedder, PickyEmbedder, SlowStartIndex,
};
use docrag::{
    Chunker, DistanceMetric, EmbeddingRecord, Indexer, InMemoryVectorIndex, IndexInfo, IndexSpec,
    RagConfig, RagError, ScoredChunk, SeparatorChunker, VectorIndex,
};

fn chunks_for(document_id: &str, text: &str) -> Vec<docrag::Chunk> {
    let config = common::config();
    SeparatorChunker::new(config.chunk_size, config.chunk_overlap)
        .unwrap()
        .chunk(&common::document(document_id, text))
}

fn chunks_of(text: &str) -> Vec<docrag::Chunk> {
    chunks_for("notes", text)
}

const TEXT: &str = "Revenue grew twelve percent. Margins improved in every region. \
                    The board approved a dividend. Headcount stayed flat.";

#[tokio::test]
async fn create_or_verify_is_idempotent() {
    let index = Arc::new(InMemoryVectorIndex::new());
    let indexer = Indexer::new(HashEmbedder::new(DIM), index.clone(), &common::config());

    let first = indexer.create_or_verify_index().await.unwrap();
    let second = indexer.create_or_verify_index().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.dimensions, DIM);
    assert_eq!(first.metric, DistanceMetric::Cosine);
    assert!(first.ready);
}

#[tokio::test]
async fn existing_index_with_other_dimensions_is_rejected() {
    let index = Arc::new(InMemoryVectorIndex::new());
    index.create_index(&IndexSpec::new("test_index", 8, DistanceMetric::Cosine)).await.unwrap();
    let indexer = Indexer::new(HashEmbedder::new(DIM), index, &common::config());

    let err = indexer.create_or_verify_index().await.unwrap_err();
    assert!(matches!(err, RagError::IndexConfigMismatch { .. }), "{err}");
}

#[tokio::test]
async fn existing_index_with_other_metric_is_rejected() {
    let index = Arc::new(InMemoryVectorIndex::new());
    index
        .create_index(&IndexSpec::new("test_index", DIM, DistanceMetric::DotProduct))
        .await
        .unwrap();
    let indexer = Indexer::new(HashEmbedder::new(DIM), index, &common::config());

    let err = indexer.create_or_verify_index().await.unwrap_err();
    assert!(matches!(err, RagError::IndexConfigMismatch { .. }), "{err}");
}

#[tokio::test]
async fn provider_dimension_mismatch_is_rejected_before_creating() {
    let index = Arc::new(InMemoryVectorIndex::new());
    let indexer = Indexer::new(HashEmbedder::new(DIM * 2), index.clone(), &common::config());

    let err = indexer.create_or_verify_index().await.unwrap_err();
    assert!(matches!(err, RagError::IndexConfigMismatch { .. }));
    assert!(index.describe_index("test_index").await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn waits_for_new_index_to_become_ready() {
    let index = SlowStartIndex::new(3);
    let indexer = Indexer::new(HashEmbedder::new(DIM), index.clone(), &common::config())
        .with_ready_poll_interval(Duration::from_millis(100));

    let info = indexer.create_or_verify_index().await.unwrap();
    assert!(info.ready);
    assert_eq!(index.describes.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn index_that_never_becomes_ready_times_out() {
    let index = SlowStartIndex::new(usize::MAX);
    let indexer = Indexer::new(HashEmbedder::new(DIM), index, &common::config())
        .with_ready_poll_interval(Duration::from_millis(100));

    let err = indexer.create_or_verify_index().await.unwrap_err();
    assert!(matches!(err, RagError::Timeout { .. }), "{err}");
}

#[tokio::test]
async fn indexes_every_chunk_in_order() {
    let index = Arc::new(InMemoryVectorIndex::new());
    let indexer = Indexer::new(HashEmbedder::new(DIM), index.clone(), &common::config());
    indexer.create_or_verify_index().await.unwrap();

    let chunks = chunks_of(TEXT);
    let expected: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
    let report = indexer.index_chunks("notes", chunks).await;

    assert!(report.is_complete());
    assert_eq!(report.succeeded, expected);
    assert_eq!(report.total_chunks, expected.len());
    let info = index.describe_index("test_index").await.unwrap().unwrap();
    assert_eq!(info.record_count, expected.len());
}

#[tokio::test]
async fn reingesting_replaces_records() {
    let index = Arc::new(InMemoryVectorIndex::new());
    let indexer = Indexer::new(HashEmbedder::new(DIM), index.clone(), &common::config());
    indexer.create_or_verify_index().await.unwrap();

    indexer.index_chunks("notes", chunks_of(TEXT)).await;
    let report = indexer.index_chunks("notes", chunks_of(TEXT)).await;

    let info = index.describe_index("test_index").await.unwrap().unwrap();
    assert_eq!(info.record_count, report.total_chunks);
}

#[tokio::test]
async fn permanent_chunk_failures_are_reported_not_fatal() {
    let index = Arc::new(InMemoryVectorIndex::new());
    let embedder = Arc::new(PickyEmbedder { poison: "dividend" });
    let indexer = Indexer::new(embedder, index.clone(), &common::config());
    indexer.create_or_verify_index().await.unwrap();

    let chunks = chunks_of(TEXT);
    let poisoned: Vec<String> =
        chunks.iter().filter(|c| c.text.contains("dividend")).map(|c| c.id.clone()).collect();
    assert!(!poisoned.is_empty());

    let report = indexer.index_chunks("notes", chunks).await;

    assert!(!report.is_complete());
    let failed: Vec<String> = report.failed.iter().map(|f| f.chunk_id.clone()).collect();
    assert_eq!(failed, poisoned);
    assert_eq!(report.succeeded.len() + report.failed.len(), report.total_chunks);
    assert!(report.failed.iter().all(|f| f.error.contains("content rejected")));
    let info = index.describe_index("test_index").await.unwrap().unwrap();
    assert_eq!(info.record_count, report.succeeded.len());
}

#[tokio::test]
async fn transient_embedding_failures_are_retried() {
    let index = Arc::new(InMemoryVectorIndex::new());
    let embedder = FlakyEmbedder::new(2);
    let config = RagConfig { ingest_concurrency: 1, ..common::config() };
    let indexer = Indexer::new(embedder.clone(), index, &config);
    indexer.create_or_verify_index().await.unwrap();

    let chunks = chunks_of("short note");
    let report = indexer.index_chunks("notes", chunks).await;

    assert!(report.is_complete());
    assert_eq!(embedder.calls(), 3);
}

#[tokio::test]
async fn gives_up_after_max_retries() {
    let index = Arc::new(InMemoryVectorIndex::new());
    let embedder = FlakyEmbedder::new(10);
    let indexer = Indexer::new(embedder.clone(), index, &common::config());
    indexer.create_or_verify_index().await.unwrap();

    let report = indexer.index_chunks("notes", chunks_of("short note")).await;

    assert_eq!(report.failed.len(), 1);
    assert_eq!(embedder.calls(), 3);
}

#[tokio::test]
async fn missing_index_fails_every_chunk() {
    let index = Arc::new(InMemoryVectorIndex::new());
    let indexer = Indexer::new(HashEmbedder::new(DIM), index, &common::config());

    let report = indexer.index_chunks("notes", chunks_of(TEXT)).await;
    assert!(report.succeeded.is_empty());
    assert_eq!(report.failed.len(), report.total_chunks);
}

#[tokio::test]
async fn delete_document_removes_its_chunks() {
    let index = Arc::new(InMemoryVectorIndex::new());
    let indexer = Indexer::new(HashEmbedder::new(DIM), index.clone(), &common::config());
    indexer.create_or_verify_index().await.unwrap();
    let report = indexer.index_chunks("notes", chunks_of(TEXT)).await;

    let removed = indexer.delete_document("notes").await.unwrap();

    assert_eq!(removed, report.total_chunks);
    let info = index.describe_index("test_index").await.unwrap().unwrap();
    assert_eq!(info.record_count, 0);
}

#[tokio::test]
async fn prune_keeps_only_the_given_chunks() {
    let index = Arc::new(InMemoryVectorIndex::new());
    let indexer = Indexer::new(HashEmbedder::new(DIM), index.clone(), &common::config());
    indexer.create_or_verify_index().await.unwrap();
    let report = indexer.index_chunks("notes", chunks_of(TEXT)).await;
    assert!(report.total_chunks > 2);
    indexer.index_chunks("other", chunks_for("other", "unrelated")).await;

    let keep = report.succeeded[..2].iter().cloned().collect();
    let removed = indexer.prune_document("notes", &keep).await.unwrap();

    assert_eq!(removed, report.total_chunks - 2);
    assert_eq!(index.record_ids("test_index", "notes").await.unwrap(), &report.succeeded[..2]);
    assert_eq!(index.record_ids("test_index", "other").await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrency_is_bounded() {
    let index = Arc::new(InMemoryVectorIndex::new());
    let embedder = PeakEmbedder::new();
    let config = RagConfig { ingest_concurrency: 2, ..common::config() };
    let indexer = Indexer::new(embedder.clone(), index, &config);
    indexer.create_or_verify_index().await.unwrap();

    let chunks = chunks_of(&TEXT.repeat(3));
    assert!(chunks.len() > 4);
    let report = indexer.index_chunks("notes", chunks).await;

    assert!(report.is_complete());
    assert_eq!(embedder.peak(), 2);
}

#[tokio::test(start_paused = true)]
async fn hung_embedding_fails_only_its_chunk() {
    let index = Arc::new(InMemoryVectorIndex::new());
    let embedder = HangingEmbedder::new("dividend");
    let indexer = Indexer::new(embedder.clone(), index.clone(), &common::config());
    indexer.create_or_verify_index().await.unwrap();

    let chunks = chunks_of(TEXT);
    let stalled = chunks.iter().filter(|c| c.text.contains("dividend")).count();
    let report = indexer.index_chunks("notes", chunks).await;

    assert_eq!(report.failed.len(), stalled);
    assert_eq!(report.succeeded.len() + stalled, report.total_chunks);
    assert!(report.failed.iter().all(|f| f.error.contains("embedding timed out")));
    // one attempt plus two retries per stalled chunk
    assert_eq!(embedder.calls(), report.succeeded.len() + stalled * 3);
}

#[tokio::test(start_paused = true)]
async fn hung_index_is_a_transient_store_error() {
    let index = Arc::new(InMemoryVectorIndex::new());
    let hung = Arc::new(HungIndex(index));
    let indexer = Indexer::new(HashEmbedder::new(DIM), hung, &common::config());

    let err = indexer.create_or_verify_index().await.unwrap_err();
    assert!(matches!(err, RagError::VectorStoreError { transient: true, .. }), "{err}");
}

/// Never answers `describe_index`.
struct HungIndex(Arc<InMemoryVectorIndex>);

#[async_trait::async_trait]
impl VectorIndex for HungIndex {
    fn backend(&self) -> &str {
        "hung"
    }

    async fn describe_index(&self, name: &str) -> docrag::Result<Option<IndexInfo>> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        self.0.describe_index(name).await
    }

    async fn create_index(&self, spec: &IndexSpec) -> docrag::Result<()> {
        self.0.create_index(spec).await
    }

    async fn upsert(&self, index: &str, records: &[EmbeddingRecord]) -> docrag::Result<()> {
        self.0.upsert(index, records).await
    }

    async fn delete(&self, index: &str, ids: &[&str]) -> docrag::Result<()> {
        self.0.delete(index, ids).await
    }

    async fn record_ids(&self, index: &str, document_id: &str) -> docrag::Result<Vec<String>> {
        self.0.record_ids(index, document_id).await
    }

    async fn search(
        &self,
        index: &str,
        vector: &[f32],
        top_k: usize,
    ) -> docrag::Result<Vec<ScoredChunk>> {
        self.0.search(index, vector, top_k).await
    }
}
