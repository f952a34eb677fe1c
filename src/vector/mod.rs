// Vector embedding and similarity configuration
pub const TARGET_VECTOR: &str = "artifact-embeddings";

pub mod similarity;
pub mod storage;
pub mod types;

// Re-export main components
pub use similarity::*;
pub use storage::*;
pub use types::*;

use std::sync::Arc;

use crate::errors::Result;

/// Lookup-only access to artifact embeddings.
///
/// Implementations own their embedding cache. Repeated lookups for the same id
/// must return the same vector, and results must be deterministic for a fixed
/// snapshot of artifact content.
pub trait SimilarityProvider: Send + Sync {
    /// Returns the embedding for an artifact, creating it if needed.
    fn embedding(&self, id: &str) -> Result<Arc<Vector>>;

    /// Mean of the embeddings of `ids`.
    fn centroid(&self, ids: &[ArtifactId]) -> Result<Vector> {
        let embeddings = ids
            .iter()
            .map(|id| self.embedding(id))
            .collect::<Result<Vec<_>>>()?;
        mean_vector(&embeddings)
    }

    /// Cosine similarity of every id in `ids_a` against every id in `ids_b`.
    ///
    /// Symmetric when both slices are the same.
    fn similarity_matrix(
        &self,
        ids_a: &[ArtifactId],
        ids_b: &[ArtifactId],
    ) -> Result<SimilarityMatrix> {
        let rows = ids_a
            .iter()
            .map(|id| self.embedding(id))
            .collect::<Result<Vec<_>>>()?;

        if ids_a == ids_b {
            let n = rows.len();
            let mut matrix = SimilarityMatrix::zeros(n, n);
            for i in 0..n {
                for j in i..n {
                    let score = cosine_similarity(&rows[i], &rows[j]);
                    matrix.set(i, j, score);
                    matrix.set(j, i, score);
                }
            }
            return Ok(matrix);
        }

        let cols = ids_b
            .iter()
            .map(|id| self.embedding(id))
            .collect::<Result<Vec<_>>>()?;
        let mut matrix = SimilarityMatrix::zeros(rows.len(), cols.len());
        for (i, row) in rows.iter().enumerate() {
            for (j, col) in cols.iter().enumerate() {
                matrix.set(i, j, cosine_similarity(row, col));
            }
        }
        Ok(matrix)
    }

    /// Cosine similarity between two artifacts.
    fn similarity(&self, a: &str, b: &str) -> Result<f64> {
        let left = self.embedding(a)?;
        let right = self.embedding(b)?;
        calculate_direct_similarity(&left, &right)
    }
}
