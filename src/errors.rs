//! Error types for the consensus and duplicate-detection engine.
//!
//! None of these are retried internally. Contract violations (empty clusters,
//! ambiguous replacements, missing origin maps) surface straight to the caller.

use thiserror::Error;

/// Errors raised by clustering, consensus and duplicate detection.
#[derive(Debug, Error)]
pub enum QuorumError {
    /// A cluster was built from, or asked for statistics over, zero artifacts.
    #[error("Cannot build a cluster with no artifacts")]
    EmptyCluster,

    /// `ConsensusMap::replace` was given a cluster that is not stored.
    #[error("Cluster not found in consensus map: {0}")]
    NotFound(String),

    /// `ConsensusMap::replace` matched more than one stored cluster.
    #[error("Cluster matches {0} stored clusters, expected exactly one")]
    Ambiguous(usize),

    /// Intra/inter duplicate classification requested without an origin map.
    #[error("Duplicate type '{0}' requires an originating cluster map")]
    MissingOriginMap(String),

    /// A duplicate-cluster name could not be mapped back to its origin.
    #[error("Invalid duplicate cluster name: {0}")]
    InvalidName(String),

    /// The similarity provider has no embedding and no content for this id.
    #[error("Unknown artifact: {0}")]
    UnknownArtifact(String),

    /// Two vectors of different lengths were compared or stored together.
    #[error("Vector dimensions don't match: {expected} vs {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A tuning parameter is outside its valid range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The embedder collaborator failed to produce a vector.
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// A raw clustering algorithm could not partition its input.
    #[error("Partitioning failed: {0}")]
    Partition(String),
}

/// Result alias used throughout the library modules.
pub type Result<T> = std::result::Result<T, QuorumError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_variants() {
        let cases = vec![
            (
                QuorumError::EmptyCluster,
                "Cannot build a cluster with no artifacts",
            ),
            (
                QuorumError::NotFound("[a, b]".into()),
                "Cluster not found in consensus map: [a, b]",
            ),
            (
                QuorumError::Ambiguous(2),
                "Cluster matches 2 stored clusters, expected exactly one",
            ),
            (
                QuorumError::MissingOriginMap("intra".into()),
                "Duplicate type 'intra' requires an originating cluster map",
            ),
            (
                QuorumError::InvalidName("r-7-inter".into()),
                "Invalid duplicate cluster name: r-7-inter",
            ),
            (
                QuorumError::DimensionMismatch {
                    expected: 3,
                    actual: 4,
                },
                "Vector dimensions don't match: 3 vs 4",
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.to_string(), expected);
        }
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<QuorumError>();
    }

    #[test]
    fn converts_into_anyhow() {
        let err: anyhow::Error = QuorumError::EmptyCluster.into();
        assert!(err.downcast_ref::<QuorumError>().is_some());
    }
}
