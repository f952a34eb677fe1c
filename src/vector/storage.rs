use dashmap::DashMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

use crate::errors::{QuorumError, Result};
use crate::vector::{ArtifactId, SimilarityProvider, Vector, TARGET_VECTOR};

/// Turns artifact content into an embedding.
///
/// The model behind this is an external collaborator; the store only caches
/// what it returns.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vector>;
}

/// In-memory embedding cache keyed by artifact id.
///
/// Embeddings are either inserted up front or created lazily from registered
/// content through an [`Embedder`]. The first vector stored for an id wins, so
/// concurrent lookups always observe one complete vector.
pub struct EmbeddingStore {
    embeddings: DashMap<ArtifactId, Arc<Vector>>,
    contents: DashMap<ArtifactId, String>,
    dimensions: OnceLock<usize>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl Default for EmbeddingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingStore {
    pub fn new() -> Self {
        EmbeddingStore {
            embeddings: DashMap::new(),
            contents: DashMap::new(),
            dimensions: OnceLock::new(),
            embedder: None,
        }
    }

    /// Creates a store that embeds registered content on first lookup
    pub fn with_embedder(embedder: Arc<dyn Embedder>) -> Self {
        EmbeddingStore {
            embedder: Some(embedder),
            ..Self::new()
        }
    }

    /// Builds a store from precomputed `(id, vector)` pairs
    pub fn from_embeddings<I, S>(embeddings: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Vector)>,
        S: Into<ArtifactId>,
    {
        let store = Self::new();
        for (id, vector) in embeddings {
            store.insert(id, vector)?;
        }
        info!(target: TARGET_VECTOR, "Loaded {} embeddings into store", store.len());
        Ok(store)
    }

    /// Stores a precomputed embedding
    ///
    /// # Returns
    /// * `Ok(true)` - The vector was stored
    /// * `Ok(false)` - An embedding for this id already existed and was kept
    /// * `Err` - If the vector's dimensions differ from previously stored vectors
    pub fn insert(&self, id: impl Into<ArtifactId>, vector: Vector) -> Result<bool> {
        self.check_dimensions(&vector)?;
        let id = id.into();
        if self.embeddings.contains_key(&id) {
            return Ok(false);
        }
        self.embeddings.entry(id).or_insert_with(|| Arc::new(vector));
        Ok(true)
    }

    /// Registers content to be embedded lazily
    pub fn register_content(&self, id: impl Into<ArtifactId>, content: impl Into<String>) {
        self.contents.insert(id.into(), content.into());
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions.get().copied()
    }

    fn check_dimensions(&self, vector: &Vector) -> Result<()> {
        let expected = *self.dimensions.get_or_init(|| vector.len());
        if expected != vector.len() {
            return Err(QuorumError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl SimilarityProvider for EmbeddingStore {
    fn embedding(&self, id: &str) -> Result<Arc<Vector>> {
        if let Some(existing) = self.embeddings.get(id) {
            return Ok(Arc::clone(existing.value()));
        }

        let content = self
            .contents
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| QuorumError::UnknownArtifact(id.to_string()))?;
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| QuorumError::UnknownArtifact(id.to_string()))?;

        debug!(target: TARGET_VECTOR, "Embedding artifact {} ({} chars)", id, content.len());
        let vector = embedder.embed(&content)?;
        self.check_dimensions(&vector)?;

        let stored = self
            .embeddings
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(vector));
        Ok(Arc::clone(stored.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    impl Embedder for CountingEmbedder {
        fn embed(&self, text: &str) -> Result<Vector> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    #[test]
    fn test_insert_rejects_mismatched_dimensions() {
        let store = EmbeddingStore::new();
        assert!(store.insert("a", vec![1.0, 0.0]).unwrap());
        let err = store.insert("b", vec![1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            QuorumError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        assert_eq!(store.dimensions(), Some(2));
    }

    #[test]
    fn test_first_insert_wins() {
        let store = EmbeddingStore::new();
        assert!(store.insert("a", vec![1.0, 0.0]).unwrap());
        assert!(!store.insert("a", vec![0.0, 1.0]).unwrap());
        assert_eq!(*store.embedding("a").unwrap(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_unknown_artifact() {
        let store = EmbeddingStore::new();
        assert!(matches!(
            store.embedding("missing").unwrap_err(),
            QuorumError::UnknownArtifact(id) if id == "missing"
        ));
    }

    #[test]
    fn test_lazy_embedding_is_cached() {
        let embedder = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let store = EmbeddingStore::with_embedder(embedder.clone());
        store.register_content("a", "hello");

        let first = store.embedding("a").unwrap();
        let second = store.embedding("a").unwrap();
        assert_eq!(*first, vec![5.0, 1.0]);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_similarity_matrix_is_symmetric() {
        let store = EmbeddingStore::from_embeddings(vec![
            ("a", vec![1.0, 0.0]),
            ("b", vec![1.0, 1.0]),
            ("c", vec![0.0, 1.0]),
        ])
        .unwrap();
        let ids: Vec<ArtifactId> = vec!["a".into(), "b".into(), "c".into()];
        let matrix = store.similarity_matrix(&ids, &ids).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(matrix.get(i, j), matrix.get(j, i));
            }
        }
        assert_eq!(matrix.upper_triangle().len(), 3);
        assert!((matrix.get(0, 1) - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn test_centroid() {
        let store =
            EmbeddingStore::from_embeddings(vec![("a", vec![2.0, 0.0]), ("b", vec![0.0, 2.0])])
                .unwrap();
        let centroid = store.centroid(&["a".into(), "b".into()]).unwrap();
        assert_eq!(centroid, vec![1.0, 1.0]);
    }
}
