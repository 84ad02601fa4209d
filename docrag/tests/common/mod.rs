//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use docrag::{
    Document, DocumentFormat, DocumentMetadata, EmbeddingProvider, EmbeddingRecord,
    InMemoryVectorIndex, IndexInfo, IndexSpec, LlmClient, RagConfig, RagError, RetryPolicy,
    ScoredChunk, ServiceTimeouts, VectorIndex,
};

pub const DIM: usize = 16;

pub fn document(id: &str, text: &str) -> Document {
    Document::new(
        id,
        text,
        DocumentMetadata {
            filename: format!("{id}.txt"),
            page_count: None,
            source: format!("{id}.txt"),
            format: DocumentFormat::Text,
        },
    )
}

/// A config with small chunks, fast retries and short timeouts.
pub fn config() -> RagConfig {
    RagConfig::builder()
        .index_name("test_index")
        .embedding_dimensions(DIM)
        .chunk_size(40)
        .chunk_overlap(5)
        .top_k(3)
        .retry(RetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            multiplier: 2.0,
        })
        .timeouts(ServiceTimeouts {
            embedding: Duration::from_secs(1),
            index: Duration::from_secs(1),
            generation: Duration::from_secs(1),
        })
        .build()
        .unwrap()
}

pub fn hash_embedding(text: &str, dimensions: usize) -> Vec<f32> {
    let hash = text.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
    let mut emb = vec![0.0f32; dimensions];
    for (i, v) in emb.iter_mut().enumerate() {
        *v = ((hash.wrapping_add(i as u64)) as f32).sin();
    }
    let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        emb.iter_mut().for_each(|x| *x /= norm);
    }
    emb
}

/// Deterministic hash-based embeddings. Identical texts embed identically.
pub struct HashEmbedder {
    pub dimensions: usize,
    pub calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Arc<Self> {
        Arc::new(Self { dimensions, calls: AtomicUsize::new(0) })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    async fn embed(&self, text: &str) -> docrag::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(hash_embedding(text, self.dimensions))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Fails the first `failures` calls with a transient error.
pub struct FlakyEmbedder {
    pub failures: usize,
    pub calls: AtomicUsize,
}

impl FlakyEmbedder {
    pub fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self { failures, calls: AtomicUsize::new(0) })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn embed(&self, text: &str) -> docrag::Result<Vec<f32>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(RagError::EmbeddingServiceError {
                provider: "flaky".into(),
                message: "503 Service Unavailable".into(),
                transient: true,
            });
        }
        Ok(hash_embedding(text, DIM))
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// Permanently rejects any text containing `poison`.
pub struct PickyEmbedder {
    pub poison: &'static str,
}

#[async_trait]
impl EmbeddingProvider for PickyEmbedder {
    fn name(&self) -> &str {
        "picky"
    }

    async fn embed(&self, text: &str) -> docrag::Result<Vec<f32>> {
        if text.contains(self.poison) {
            return Err(RagError::EmbeddingServiceError {
                provider: "picky".into(),
                message: "400 content rejected".into(),
                transient: false,
            });
        }
        Ok(hash_embedding(text, DIM))
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// Echoes the prompt length, failing the first `failures` calls.
pub struct CountingLlm {
    pub failures: usize,
    pub transient: bool,
    pub calls: AtomicUsize,
}

impl CountingLlm {
    pub fn new() -> Arc<Self> {
        Self::failing(0, true)
    }

    pub fn failing(failures: usize, transient: bool) -> Arc<Self> {
        Arc::new(Self { failures, transient, calls: AtomicUsize::new(0) })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for CountingLlm {
    fn name(&self) -> &str {
        "counting"
    }

    async fn generate(&self, prompt: &str) -> docrag::Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(RagError::LlmServiceError {
                provider: "counting".into(),
                message: "model overloaded".into(),
                transient: self.transient,
            });
        }
        Ok(format!("answer #{call} from a {}-char prompt", prompt.len()))
    }
}

/// Never answers within any reasonable timeout.
pub struct HangingLlm {
    pub calls: AtomicUsize,
}

impl HangingLlm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0) })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for HangingLlm {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn generate(&self, _prompt: &str) -> docrag::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok("too late".into())
    }
}

/// Hangs on any text containing `stall`, embeds everything else.
pub struct HangingEmbedder {
    pub stall: &'static str,
    pub calls: AtomicUsize,
}

impl HangingEmbedder {
    pub fn new(stall: &'static str) -> Arc<Self> {
        Arc::new(Self { stall, calls: AtomicUsize::new(0) })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for HangingEmbedder {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn embed(&self, text: &str) -> docrag::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains(self.stall) {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        Ok(hash_embedding(text, DIM))
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// Records the highest number of embed calls in flight at once.
pub struct PeakEmbedder {
    pub in_flight: AtomicUsize,
    pub peak: AtomicUsize,
}

impl PeakEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { in_flight: AtomicUsize::new(0), peak: AtomicUsize::new(0) })
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for PeakEmbedder {
    fn name(&self) -> &str {
        "peak"
    }

    async fn embed(&self, text: &str) -> docrag::Result<Vec<f32>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(hash_embedding(text, DIM))
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// Reports itself not ready for the first `not_ready` describes.
pub struct SlowStartIndex {
    pub inner: InMemoryVectorIndex,
    pub not_ready: usize,
    pub describes: AtomicUsize,
}

impl SlowStartIndex {
    pub fn new(not_ready: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryVectorIndex::new(),
            not_ready,
            describes: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl VectorIndex for SlowStartIndex {
    fn backend(&self) -> &str {
        "slow-start"
    }

    async fn describe_index(&self, name: &str) -> docrag::Result<Option<IndexInfo>> {
        let info = self.inner.describe_index(name).await?;
        Ok(info.map(|mut info| {
            let call = self.describes.fetch_add(1, Ordering::SeqCst);
            info.ready = call >= self.not_ready;
            info
        }))
    }

    async fn create_index(&self, spec: &IndexSpec) -> docrag::Result<()> {
        self.inner.create_index(spec).await
    }

    async fn record_ids(&self, index: &str, document_id: &str) -> docrag::Result<Vec<String>> {
        self.inner.record_ids(index, document_id).await
    }

    async fn upsert(&self, index: &str, records: &[EmbeddingRecord]) -> docrag::Result<()> {
        self.inner.upsert(index, records).await
    }

    async fn delete(&self, index: &str, ids: &[&str]) -> docrag::Result<()> {
        self.inner.delete(index, ids).await
    }

    async fn search(
        &self,
        index: &str,
        vector: &[f32],
        top_k: usize,
    ) -> docrag::Result<Vec<ScoredChunk>> {
        self.inner.search(index, vector, top_k).await
    }
}

/// An index whose backend is unreachable.
pub struct DownIndex;

fn down() -> RagError {
    RagError::VectorStoreError {
        backend: "down".into(),
        message: "connection refused".into(),
        transient: true,
    }
}

#[async_trait]
impl VectorIndex for DownIndex {
    fn backend(&self) -> &str {
        "down"
    }

    async fn describe_index(&self, _name: &str) -> docrag::Result<Option<IndexInfo>> {
        Err(down())
    }

    async fn create_index(&self, _spec: &IndexSpec) -> docrag::Result<()> {
        Err(down())
    }

    async fn record_ids(&self, _index: &str, _document_id: &str) -> docrag::Result<Vec<String>> {
        Err(down())
    }

    async fn upsert(&self, _index: &str, _records: &[EmbeddingRecord]) -> docrag::Result<()> {
        Err(down())
    }

    async fn delete(&self, _index: &str, _ids: &[&str]) -> docrag::Result<()> {
        Err(down())
    }

    async fn search(
        &self,
        _index: &str,
        _vector: &[f32],
        _top_k: usize,
    ) -> docrag::Result<Vec<ScoredChunk>> {
        Err(down())
    }
}
