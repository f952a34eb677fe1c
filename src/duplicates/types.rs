use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use crate::vector::ArtifactId;

/// Which duplicate edges to keep relative to the originating clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DuplicateType {
    All,
    IntraCluster,
    InterCluster,
}

impl DuplicateType {
    /// Short value used in duplicate-cluster names
    pub fn value(&self) -> &'static str {
        match self {
            DuplicateType::All => "all",
            DuplicateType::IntraCluster => "intra",
            DuplicateType::InterCluster => "inter",
        }
    }

    pub fn from_value(value: &str) -> Option<Self> {
        match value {
            "all" => Some(DuplicateType::All),
            "intra" => Some(DuplicateType::IntraCluster),
            "inter" => Some(DuplicateType::InterCluster),
            _ => None,
        }
    }
}

impl fmt::Display for DuplicateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Artifact id -> ids judged duplicates of it; always symmetric
pub type DuplicateMap = BTreeMap<ArtifactId, BTreeSet<ArtifactId>>;

/// Upstream cluster id -> content strings that cluster produced
pub type OriginatingClusterMap = HashMap<String, HashSet<String>>;

/// Duplicates found among a set of artifacts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DuplicateReport {
    pub duplicate_ids: BTreeSet<ArtifactId>,
    pub duplicate_map: DuplicateMap,

    // Exceedance count plus mean similarity to all others, per duplicate
    pub counts: BTreeMap<ArtifactId, f64>,

    // Similarity a pair had to reach; `None` when nothing was compared
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

impl DuplicateReport {
    pub fn is_empty(&self) -> bool {
        self.duplicate_ids.is_empty()
    }

    /// Unordered duplicate pairs, each listed once with the smaller id first
    pub fn edges(&self) -> BTreeSet<(ArtifactId, ArtifactId)> {
        let mut edges = BTreeSet::new();
        for (id, duplicates) in &self.duplicate_map {
            for other in duplicates {
                if id < other {
                    edges.insert((id.clone(), other.clone()));
                } else {
                    edges.insert((other.clone(), id.clone()));
                }
            }
        }
        edges
    }
}

/// How the members of a duplicate family relate to their upstream clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DuplicateCategory {
    // Every duplicate edge stays within one originating cluster
    Intra,
    // Every duplicate edge crosses originating clusters
    Inter,
    Mixed,
}

/// A connected group of duplicates, named for downstream regeneration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateFamily {
    pub name: String,
    pub members: BTreeSet<ArtifactId>,
    pub category: DuplicateCategory,
}
