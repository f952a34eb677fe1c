use std::sync::Arc;

use crate::errors::{QuorumError, Result};
use crate::vector::Vector;

/// Magnitude below which a vector is treated as having no direction
const MIN_MAGNITUDE: f64 = 0.001;

/// Calculate cosine similarity directly between two vectors
///
/// # Arguments
/// * `vec1` - First vector
/// * `vec2` - Second vector
///
/// # Returns
/// * `Ok(f64)` - The cosine similarity, `0.0` when either vector has near-zero magnitude
/// * `Err` - If the vector dimensions differ
pub fn calculate_direct_similarity(vec1: &[f32], vec2: &[f32]) -> Result<f64> {
    if vec1.len() != vec2.len() {
        return Err(QuorumError::DimensionMismatch {
            expected: vec1.len(),
            actual: vec2.len(),
        });
    }

    Ok(cosine_similarity(vec1, vec2))
}

/// Cosine similarity of two vectors of equal length.
///
/// Zero-magnitude vectors score `0.0` so threshold computations stay total.
pub fn cosine_similarity(vec1: &[f32], vec2: &[f32]) -> f64 {
    let mag1 = magnitude(vec1);
    let mag2 = magnitude(vec2);

    if mag1 < MIN_MAGNITUDE || mag2 < MIN_MAGNITUDE {
        return 0.0;
    }

    let dot_product: f64 = vec1
        .iter()
        .zip(vec2.iter())
        .map(|(a, b)| f64::from(*a) * f64::from(*b))
        .sum();

    dot_product / (mag1 * mag2)
}

/// Euclidean norm of a vector
pub fn magnitude(vec: &[f32]) -> f64 {
    vec.iter()
        .map(|x| f64::from(*x) * f64::from(*x))
        .sum::<f64>()
        .sqrt()
}

/// Element-wise mean of a set of equally sized vectors
///
/// # Returns
/// * `Ok(Vector)` - The centroid
/// * `Err` - If no vectors were given or their dimensions differ
pub fn mean_vector(vectors: &[Arc<Vector>]) -> Result<Vector> {
    let first = vectors.first().ok_or(QuorumError::EmptyCluster)?;
    let dimensions = first.len();

    let mut sums = vec![0.0f64; dimensions];
    for vector in vectors {
        if vector.len() != dimensions {
            return Err(QuorumError::DimensionMismatch {
                expected: dimensions,
                actual: vector.len(),
            });
        }
        for (sum, value) in sums.iter_mut().zip(vector.iter()) {
            *sum += f64::from(*value);
        }
    }

    let count = vectors.len() as f64;
    Ok(sums.into_iter().map(|sum| (sum / count) as f32).collect())
}
