//! Brute-force nearest-neighbor index over chunk embeddings.
//!
//! The distance metric is fixed when the index is created. Hits are
//! oriented so that higher scores are better regardless of metric:
//! cosine similarity directly, Euclidean as the negated distance. Both
//! removal and query are linear scans — acceptable at the corpus sizes
//! this store targets, and callers batch removals.

use crate::error::{RagError, Result};

/// Distance metric, fixed at index creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
}

/// A scored neighbor returned by [`VectorIndex::query`].
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub chunk_id: String,
    pub document_id: String,
    /// Higher is better: cosine similarity, or negated Euclidean distance.
    pub score: f64,
}

#[derive(Debug)]
struct VectorEntry {
    chunk_id: String,
    document_id: String,
    vector: Vec<f32>,
}

/// In-memory vector index with exact search.
#[derive(Debug)]
pub struct VectorIndex {
    dims: usize,
    metric: DistanceMetric,
    entries: Vec<VectorEntry>,
}

impl VectorIndex {
    pub fn new(dims: usize, metric: DistanceMetric) -> Self {
        Self {
            dims,
            metric,
            entries: Vec::new(),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store an embedding for a chunk. Re-adding a chunk id replaces its
    /// previous vector.
    pub fn add(&mut self, chunk_id: &str, document_id: &str, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dims {
            return Err(RagError::DimensionMismatch {
                expected: self.dims,
                actual: vector.len(),
            });
        }
        self.entries.retain(|e| e.chunk_id != chunk_id);
        self.entries.push(VectorEntry {
            chunk_id: chunk_id.to_string(),
            document_id: document_id.to_string(),
            vector,
        });
        Ok(())
    }

    /// Remove every vector belonging to a document. O(index size).
    pub fn remove_document(&mut self, document_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.document_id != document_id);
        before - self.entries.len()
    }

    /// Top-k neighbors of `query`, best first, ties broken by chunk id.
    /// An empty index yields an empty vector, not an error.
    pub fn query(&self, query: &[f32], k: usize) -> Vec<VectorHit> {
        let mut hits: Vec<VectorHit> = self
            .entries
            .iter()
            .map(|e| VectorHit {
                chunk_id: e.chunk_id.clone(),
                document_id: e.document_id.clone(),
                score: self.similarity(query, &e.vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);
        hits
    }

    fn similarity(&self, a: &[f32], b: &[f32]) -> f64 {
        match self.metric {
            DistanceMetric::Cosine => cosine_similarity(a, b) as f64,
            DistanceMetric::Euclidean => -(euclidean_distance(a, b) as f64),
        }
    }
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or
/// length-mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Euclidean (L2) distance; `f32::MAX` for length-mismatched vectors so
/// such entries sort last.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::MAX;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_empty_and_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_query_empty_index_returns_empty() {
        let index = VectorIndex::new(3, DistanceMetric::Cosine);
        assert!(index.query(&[1.0, 0.0, 0.0], 5).is_empty());
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut index = VectorIndex::new(3, DistanceMetric::Cosine);
        let err = index.add("c1", "d1", vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_nearest_neighbor_ordering_cosine() {
        let mut index = VectorIndex::new(2, DistanceMetric::Cosine);
        index.add("c1", "d1", vec![1.0, 0.0]).unwrap();
        index.add("c2", "d1", vec![0.0, 1.0]).unwrap();
        index.add("c3", "d2", vec![0.7, 0.7]).unwrap();

        let hits = index.query(&[1.0, 0.1], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, "c1");
        assert_eq!(hits[1].chunk_id, "c3");
    }

    #[test]
    fn test_nearest_neighbor_ordering_euclidean() {
        let mut index = VectorIndex::new(2, DistanceMetric::Euclidean);
        index.add("c1", "d1", vec![0.0, 0.0]).unwrap();
        index.add("c2", "d1", vec![5.0, 5.0]).unwrap();

        let hits = index.query(&[1.0, 1.0], 2);
        assert_eq!(hits[0].chunk_id, "c1");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_remove_document() {
        let mut index = VectorIndex::new(2, DistanceMetric::Cosine);
        index.add("c1", "d1", vec![1.0, 0.0]).unwrap();
        index.add("c2", "d1", vec![0.0, 1.0]).unwrap();
        index.add("c3", "d2", vec![1.0, 1.0]).unwrap();

        assert_eq!(index.remove_document("d1"), 2);
        assert_eq!(index.len(), 1);
        let hits = index.query(&[1.0, 0.0], 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "c3");
        assert_eq!(index.remove_document("d1"), 0);
    }

    #[test]
    fn test_readd_replaces_vector() {
        let mut index = VectorIndex::new(2, DistanceMetric::Cosine);
        index.add("c1", "d1", vec![1.0, 0.0]).unwrap();
        index.add("c1", "d1", vec![0.0, 1.0]).unwrap();
        assert_eq!(index.len(), 1);
        let hits = index.query(&[0.0, 1.0], 1);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }
}
