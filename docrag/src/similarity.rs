//! Similarity functions and result ordering shared by the vector index backends.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::ScoredChunk;

/// The similarity function an index is configured with.
///
/// Higher scores always mean "more similar".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine of the angle between the vectors, in `[-1, 1]`.
    #[default]
    Cosine,
    /// Raw inner product.
    DotProduct,
}

impl DistanceMetric {
    /// Score `a` against `b` under this metric.
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => cosine_similarity(a, b),
            Self::DotProduct => dot_product(a, b),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cosine => write!(f, "cosine"),
            Self::DotProduct => write!(f, "dot_product"),
        }
    }
}

/// Inner product of two vectors.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot = dot_product(a, b);
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// NaN scores compare below every real score.
fn sortable(score: f32) -> f32 {
    if score.is_nan() { f32::NEG_INFINITY } else { score }
}

/// Descending score, then ascending record id for equal scores.
///
/// A total order: NaN scores sort after everything else.
pub fn rank_order(a: &ScoredChunk, b: &ScoredChunk) -> Ordering {
    sortable(b.score)
        .total_cmp(&sortable(a.score))
        .then_with(|| a.record.id.cmp(&b.record.id))
}

/// Sort `results` into rank order and keep the first `top_k`.
pub fn rank(results: &mut Vec<ScoredChunk>, top_k: usize) {
    results.sort_by(rank_order);
    results.truncate(top_k);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::EmbeddingRecord;

    fn scored(id: &str, score: f32) -> ScoredChunk {
        ScoredChunk { record: EmbeddingRecord::new(id, "doc", vec![], ""), score }
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = [0.3, -0.2, 0.9];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn dot_product_is_unnormalized() {
        assert_eq!(DistanceMetric::DotProduct.score(&[2.0, 0.0], &[3.0, 1.0]), 6.0);
    }

    #[test]
    fn equal_scores_break_ties_by_id() {
        let mut results = vec![scored("c", 0.5), scored("a", 0.5), scored("b", 0.9)];
        rank(&mut results, 10);
        let ids: Vec<&str> = results.iter().map(|r| r.record.id.as_str()).collect();
        assert_eq!(ids, ["b", "a", "c"]);
    }

    #[test]
    fn rank_truncates_to_top_k() {
        let mut results = vec![scored("a", 0.1), scored("b", 0.2), scored("c", 0.3)];
        rank(&mut results, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].record.id, "c");
    }

    #[test]
    fn nan_scores_rank_last() {
        let mut results = vec![
            scored("nan", f32::NAN),
            scored("low", -1.0),
            scored("high", 0.8),
            scored("also_nan", f32::NAN),
        ];
        rank(&mut results, 10);
        let ids: Vec<&str> = results.iter().map(|r| r.record.id.as_str()).collect();
        assert_eq!(ids, ["high", "low", "also_nan", "nan"]);
    }
}
