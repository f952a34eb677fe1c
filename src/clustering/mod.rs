// Module declarations
pub mod algorithms;
pub mod assignment;
pub mod cluster;
pub mod condense;
pub mod consensus;
pub mod types;
pub mod util;

pub use types::*;

pub use algorithms::{
    labels_to_clusters, AgglomerativeParams, ClusteringAlgorithm, DbscanParams, KMeansParams,
    Linkage, RawClusteringAlgorithm, NOISE_LABEL,
};
pub use assignment::{OrphanPlacer, PlacementReport};
pub use cluster::Cluster;
pub use condense::{CandidateMap, Condenser};
pub use consensus::ConsensusMap;
pub use util::{percentile, ClusterIdAllocator};

pub const TARGET_CONSENSUS: &str = "consensus";
pub const TARGET_ORPHANS: &str = "orphans";

/// Average set overlap at which a candidate counts as a vote for a stored cluster
pub const CLUSTER_INTERSECTION_THRESHOLD: f64 = 0.6;

/// Centroid similarity at which a candidate is merged into a stored cluster
pub const MERGE_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Minimum share of never-seen artifacts for a candidate to count as novel
pub const NEW_ARTIFACT_RATIO: f64 = 0.25;

/// Smallest candidate cluster kept by the condenser
pub const MIN_CLUSTER_SIZE: usize = 1;

/// Largest candidate cluster kept by the condenser
pub const MAX_CLUSTER_SIZE: usize = 10;

/// Pairwise cohesion that is always good enough to keep a candidate
pub const MIN_PAIRWISE_SIMILARITY: f64 = 0.6;

/// Percentile of candidate cohesion used when no candidate reaches the floor
pub const COHESION_FALLBACK_PERCENTILE: f64 = 25.0;

/// Votes a consensus cluster needs to survive into the final map
pub const MIN_VOTES: u32 = 1;

/// Divides a cluster's own cohesion before comparing an orphan against it
pub const ORPHAN_LENIENCY: f64 = 1.3;

/// Most clusters an orphan may join before it is considered too generic
pub const MAX_WANTING_CLUSTERS: usize = 3;
