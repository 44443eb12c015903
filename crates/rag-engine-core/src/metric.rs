//! Similarity metrics and their "higher = better" normalization.
//!
//! | Metric | Raw value | Reported `score` |
//! |--------|-----------|------------------|
//! | `cosine` | `a·b / (‖a‖‖b‖)` | raw value |
//! | `inner_product` | `a·b` | raw value |
//! | `l2` | `‖a − b‖` | `1 / (1 + distance)` |
//!
//! Every metric reports through [`Metric::similarity`], so threshold
//! filtering and reranking never need to know which metric ran.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RagError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Cosine,
    L2,
    InnerProduct,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Cosine, Metric::L2, Metric::InnerProduct];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::L2 => "l2",
            Metric::InnerProduct => "inner_product",
        }
    }

    /// Normalized similarity between a query and a stored vector.
    ///
    /// Both slices must have the same length; the index checks this before
    /// scoring.
    pub fn similarity(&self, query: &[f32], stored: &[f32]) -> f64 {
        match self {
            Metric::Cosine => cosine_similarity(query, stored),
            Metric::InnerProduct => dot(query, stored),
            Metric::L2 => distance_to_similarity(l2_distance(query, stored)),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cosine" => Ok(Metric::Cosine),
            "l2" => Ok(Metric::L2),
            "inner_product" => Ok(Metric::InnerProduct),
            other => Err(RagError::InvalidParameter(format!(
                "unknown search_type '{}'. Use cosine, l2, or inner_product.",
                other
            ))),
        }
    }
}

/// Map an L2 distance onto `(0, 1]`, where `1.0` means identical vectors.
///
/// Strictly decreasing in `distance`, so it preserves distance ordering
/// inverted.
pub fn distance_to_similarity(distance: f64) -> f64 {
    1.0 / (1.0 + distance)
}

pub fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum()
}

/// Euclidean distance between two vectors of equal length.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`. Returns `0.0` for empty vectors,
/// vectors of different lengths, or a zero-magnitude vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f64::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Scale a vector to unit length. Zero vectors are returned unchanged.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm = v
        .iter()
        .map(|x| f64::from(*x) * f64::from(*x))
        .sum::<f64>()
        .sqrt();
    if norm < f64::EPSILON {
        return v.to_vec();
    }
    v.iter().map(|x| (f64::from(*x) / norm) as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_inner_product_keeps_sign() {
        let a = vec![1.0, 0.0];
        let b = vec![-2.0, 0.0];
        assert!((Metric::InnerProduct.similarity(&a, &b) + 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_l2_identical_is_one() {
        let v = vec![0.3, -0.4];
        assert!((Metric::L2.similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_l2_similarity_inverts_distance_order() {
        let q = vec![0.0, 0.0];
        let near = vec![1.0, 0.0];
        let far = vec![3.0, 4.0];
        assert!(l2_distance(&q, &near) < l2_distance(&q, &far));
        assert!(Metric::L2.similarity(&q, &near) > Metric::L2.similarity(&q, &far));
        assert!((Metric::L2.similarity(&q, &far) - 1.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_unit_length() {
        let n = normalize(&[3.0, 4.0]);
        assert!((n[0] - 0.6).abs() < 1e-6);
        assert!((n[1] - 0.8).abs() < 1e-6);
        assert_eq!(normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_metric_parse_and_display() {
        for m in Metric::ALL {
            assert_eq!(m.as_str().parse::<Metric>().unwrap(), m);
        }
        let err = "manhattan".parse::<Metric>().unwrap_err();
        assert!(matches!(err, RagError::InvalidParameter(_)));
        assert_eq!(Metric::InnerProduct.to_string(), "inner_product");
    }

    #[test]
    fn test_metric_serde_names() {
        let m: Metric = serde_json::from_str("\"inner_product\"").unwrap();
        assert_eq!(m, Metric::InnerProduct);
        assert_eq!(serde_json::to_string(&Metric::L2).unwrap(), "\"l2\"");
    }
}
