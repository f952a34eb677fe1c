use serde::{Deserialize, Serialize};

/// Opaque artifact identifier
pub type ArtifactId = String;

/// Dense embedding vector
pub type Vector = Vec<f32>;

/// A unit of content known to the engine by id.
///
/// The content is opaque here; it is only compared verbatim when tracing an
/// artifact back to the upstream cluster that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub content: String,
}

impl Artifact {
    pub fn new(id: impl Into<ArtifactId>, content: impl Into<String>) -> Self {
        Artifact {
            id: id.into(),
            content: content.into(),
        }
    }
}

/// Row-major matrix of similarity scores
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl SimilarityMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        SimilarityMatrix {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Scores of the unique unordered pairs `(i, j)` with `i < j`, row by row.
    ///
    /// The diagonal is never included.
    pub fn upper_triangle(&self) -> Vec<f64> {
        let n = self.rows.min(self.cols);
        let mut scores = Vec::with_capacity(n * n.saturating_sub(1) / 2);
        for i in 0..n {
            for j in (i + 1)..n {
                scores.push(self.get(i, j));
            }
        }
        scores
    }

    /// Mean similarity of `row` to every other column, excluding the diagonal.
    pub fn mean_off_diagonal(&self, row: usize) -> f64 {
        let others = self
            .row(row)
            .iter()
            .enumerate()
            .filter(|(col, _)| *col != row)
            .map(|(_, score)| *score)
            .collect::<Vec<_>>();
        if others.is_empty() {
            return 0.0;
        }
        others.iter().sum::<f64>() / others.len() as f64
    }
}
