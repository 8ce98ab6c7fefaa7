//! Similarity metrics for embedding vectors.
//!
//! Every metric exposes two views of the same quantity: a *distance* where
//! lower is more similar (used to navigate the approximate graph) and a
//! *score* where higher is more similar (what callers see in results). The
//! two are related by a strictly decreasing map, so ranking by either gives
//! the same order.

use serde::{Deserialize, Serialize};

/// Supported similarity metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine similarity. Score range `[-1, 1]`.
    #[default]
    Cosine,
    /// Raw inner product, for providers that emit pre-normalized vectors.
    DotProduct,
    /// Negated Euclidean distance. Score range `(-inf, 0]`.
    Euclidean,
}

impl DistanceMetric {
    /// Computes the distance between two vectors (lower = more similar).
    #[inline]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

        match self {
            DistanceMetric::Cosine => cosine_distance(a, b),
            DistanceMetric::DotProduct => -dot_product(a, b), // Negate so lower = better
            DistanceMetric::Euclidean => euclidean_distance(a, b),
        }
    }

    /// Computes the similarity score between two vectors (higher = more similar).
    #[inline]
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        self.score_from_distance(self.distance(a, b))
    }

    /// Converts a distance produced by [`distance`](Self::distance) into a score.
    #[inline]
    pub fn score_from_distance(&self, distance: f32) -> f32 {
        match self {
            DistanceMetric::Cosine => 1.0 - distance,
            DistanceMetric::DotProduct | DistanceMetric::Euclidean => -distance,
        }
    }

    /// Stable one-byte tag used by the on-disk snapshot header.
    pub(crate) fn to_tag(self) -> u8 {
        match self {
            DistanceMetric::Cosine => 1,
            DistanceMetric::DotProduct => 2,
            DistanceMetric::Euclidean => 3,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(DistanceMetric::Cosine),
            2 => Some(DistanceMetric::DotProduct),
            3 => Some(DistanceMetric::Euclidean),
            _ => None,
        }
    }
}

/// Computes Euclidean (L2) distance between two vectors.
///
/// Formula: sqrt(sum((a[i] - b[i])^2))
#[inline]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum::<f32>()
        .sqrt()
}

/// Computes cosine distance between two vectors.
///
/// Formula: 1 - (a · b) / (||a|| * ||b||)
/// Range: [0, 2] where 0 = identical direction, 2 = opposite direction
#[inline]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot = dot_product(a, b);
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    let denominator = norm_a * norm_b;
    if denominator == 0.0 {
        return 1.0; // Undefined, treat as orthogonal
    }

    1.0 - (dot / denominator)
}

/// Computes dot product (inner product) between two vectors.
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        assert!((euclidean_distance(&a, &b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_identical_direction() {
        let a = [1.0, 0.0];
        let b = [2.0, 0.0];
        assert!(cosine_distance(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_opposite() {
        let a = [1.0, 0.0];
        let b = [-1.0, 0.0];
        assert!((cosine_distance(&a, &b) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector() {
        assert!((cosine_distance(&[0.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_score_is_similarity() {
        let metric = DistanceMetric::Cosine;
        assert!((metric.score(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(metric.score(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((metric.score(&[1.0, 0.0], &[0.6, 0.8]) - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_dot_product_score() {
        let metric = DistanceMetric::DotProduct;
        // 1*4 + 2*5 + 3*6 = 32
        assert!((metric.score(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]) - 32.0).abs() < 1e-6);
    }

    #[test]
    fn test_score_order_matches_distance_order() {
        let q = [1.0, 0.2, 0.0];
        let near = [0.9, 0.3, 0.0];
        let far = [0.0, 0.1, 1.0];
        for metric in [
            DistanceMetric::Cosine,
            DistanceMetric::DotProduct,
            DistanceMetric::Euclidean,
        ] {
            assert!(metric.distance(&q, &near) < metric.distance(&q, &far));
            assert!(metric.score(&q, &near) > metric.score(&q, &far));
        }
    }

    #[test]
    fn test_metric_tag_roundtrip() {
        for metric in [
            DistanceMetric::Cosine,
            DistanceMetric::DotProduct,
            DistanceMetric::Euclidean,
        ] {
            assert_eq!(DistanceMetric::from_tag(metric.to_tag()), Some(metric));
        }
        assert_eq!(DistanceMetric::from_tag(0), None);
    }
}
