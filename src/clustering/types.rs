use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::cluster::Cluster;
use crate::vector::ArtifactId;

/// Identifier assigned to a cluster by the map that stores it
pub type ClusterId = usize;

/// Final consensus clusters keyed by dense cluster id
pub type ClusterMap = BTreeMap<ClusterId, Cluster>;

/// Cohesion statistics of a cluster
///
/// The pairwise fields are only defined for clusters with more than one member.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterStats {
    // Mean similarity of each member to the centroid
    pub avg_similarity: f64,

    // Least similar member pair
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_sim: Option<f64>,

    // Most similar member pair
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_sim: Option<f64>,

    // Mean over all unique member pairs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_pairwise_sim: Option<f64>,
}

/// Immutable record of a cluster, safe to persist or hand to other stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub id: ClusterId,
    pub artifact_ids: Vec<ArtifactId>,
    pub votes: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ClusterStats>,
}

/// Result of one full consensus run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusSnapshot {
    pub created_at: String,
    pub clusters: Vec<ClusterSnapshot>,
}

impl ConsensusSnapshot {
    /// Captures every cluster of a map, stamped with the current time
    pub fn from_clusters(clusters: &ClusterMap) -> Self {
        ConsensusSnapshot {
            created_at: chrono::Utc::now().to_rfc3339(),
            clusters: clusters
                .iter()
                .map(|(id, cluster)| cluster.snapshot(*id))
                .collect(),
        }
    }

    /// Cluster ids containing the given artifact
    pub fn clusters_for(&self, artifact_id: &str) -> Vec<ClusterId> {
        self.clusters
            .iter()
            .filter(|c| c.artifact_ids.iter().any(|id| id == artifact_id))
            .map(|c| c.id)
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
