//! Tuning knobs for every stage of the engine.
//!
//! All thresholds are empirically tuned; the defaults live as named constants
//! next to the code that uses them and can be overridden here or through
//! `QUORUM_*` environment variables.

use serde::{Deserialize, Serialize};

use crate::clustering::{
    CLUSTER_INTERSECTION_THRESHOLD, COHESION_FALLBACK_PERCENTILE, MAX_CLUSTER_SIZE,
    MAX_WANTING_CLUSTERS, MERGE_SIMILARITY_THRESHOLD, MIN_CLUSTER_SIZE, MIN_PAIRWISE_SIMILARITY,
    MIN_VOTES, NEW_ARTIFACT_RATIO, ORPHAN_LENIENCY,
};
use crate::duplicates::{
    DUPLICATE_BASE_QUANTILE, DUPLICATE_BASE_THRESHOLD, DUPLICATE_SIGMA, SIMILARITY_EPSILON,
};
use crate::environment::get_env_var_or;

/// How the consensus map votes on, merges and accepts candidates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub intersection_threshold: f64,
    pub merge_similarity_threshold: f64,
    pub new_artifact_ratio: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        ConsensusConfig {
            intersection_threshold: CLUSTER_INTERSECTION_THRESHOLD,
            merge_similarity_threshold: MERGE_SIMILARITY_THRESHOLD,
            new_artifact_ratio: NEW_ARTIFACT_RATIO,
        }
    }
}

/// Candidate filtering before consensus
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CondenserConfig {
    pub min_cluster_size: usize,
    pub max_cluster_size: usize,
    pub cohesion_floor: f64,
    pub fallback_percentile: f64,
    pub min_votes: u32,
}

impl Default for CondenserConfig {
    fn default() -> Self {
        CondenserConfig {
            min_cluster_size: MIN_CLUSTER_SIZE,
            max_cluster_size: MAX_CLUSTER_SIZE,
            cohesion_floor: MIN_PAIRWISE_SIMILARITY,
            fallback_percentile: COHESION_FALLBACK_PERCENTILE,
            min_votes: MIN_VOTES,
        }
    }
}

/// When an existing cluster accepts an orphan
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrphanConfig {
    pub leniency: f64,
    pub max_wanting_clusters: usize,
}

impl Default for OrphanConfig {
    fn default() -> Self {
        OrphanConfig {
            leniency: ORPHAN_LENIENCY,
            max_wanting_clusters: MAX_WANTING_CLUSTERS,
        }
    }
}

/// Calibration of the dynamic duplicate threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateConfig {
    // Quantile of pair scores used as the base threshold for 3+ artifacts
    pub base_quantile: f64,
    // Fixed threshold for 2 artifacts, where no distribution exists
    pub base_threshold: f64,
    // Standard deviations above the harmonic mean that mark an outlier pair
    pub sigma: f64,
    pub epsilon: f64,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        DuplicateConfig {
            base_quantile: DUPLICATE_BASE_QUANTILE,
            base_threshold: DUPLICATE_BASE_THRESHOLD,
            sigma: DUPLICATE_SIGMA,
            epsilon: SIMILARITY_EPSILON,
        }
    }
}

/// Configuration for a full engine run
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub consensus: ConsensusConfig,
    pub condenser: CondenserConfig,
    pub orphans: OrphanConfig,
    pub duplicates: DuplicateConfig,
}

impl EngineConfig {
    /// Builds a config from `QUORUM_*` environment variables over the defaults
    pub fn from_env() -> Self {
        let defaults = EngineConfig::default();
        EngineConfig {
            consensus: ConsensusConfig {
                intersection_threshold: get_env_var_or(
                    "QUORUM_INTERSECTION_THRESHOLD",
                    defaults.consensus.intersection_threshold,
                ),
                merge_similarity_threshold: get_env_var_or(
                    "QUORUM_MERGE_SIMILARITY_THRESHOLD",
                    defaults.consensus.merge_similarity_threshold,
                ),
                new_artifact_ratio: get_env_var_or(
                    "QUORUM_NEW_ARTIFACT_RATIO",
                    defaults.consensus.new_artifact_ratio,
                ),
            },
            condenser: CondenserConfig {
                min_cluster_size: get_env_var_or(
                    "QUORUM_MIN_CLUSTER_SIZE",
                    defaults.condenser.min_cluster_size,
                ),
                max_cluster_size: get_env_var_or(
                    "QUORUM_MAX_CLUSTER_SIZE",
                    defaults.condenser.max_cluster_size,
                ),
                cohesion_floor: get_env_var_or(
                    "QUORUM_COHESION_FLOOR",
                    defaults.condenser.cohesion_floor,
                ),
                fallback_percentile: get_env_var_or(
                    "QUORUM_COHESION_PERCENTILE",
                    defaults.condenser.fallback_percentile,
                ),
                min_votes: get_env_var_or("QUORUM_MIN_VOTES", defaults.condenser.min_votes),
            },
            orphans: OrphanConfig {
                leniency: get_env_var_or("QUORUM_ORPHAN_LENIENCY", defaults.orphans.leniency),
                max_wanting_clusters: get_env_var_or(
                    "QUORUM_MAX_WANTING_CLUSTERS",
                    defaults.orphans.max_wanting_clusters,
                ),
            },
            duplicates: DuplicateConfig {
                base_quantile: get_env_var_or(
                    "QUORUM_DUPLICATE_QUANTILE",
                    defaults.duplicates.base_quantile,
                ),
                base_threshold: get_env_var_or(
                    "QUORUM_DUPLICATE_THRESHOLD",
                    defaults.duplicates.base_threshold,
                ),
                sigma: get_env_var_or("QUORUM_DUPLICATE_SIGMA", defaults.duplicates.sigma),
                epsilon: defaults.duplicates.epsilon,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.consensus.intersection_threshold, 0.6);
        assert_eq!(config.consensus.merge_similarity_threshold, 0.85);
        assert_eq!(config.condenser.max_cluster_size, 10);
        assert_eq!(config.condenser.fallback_percentile, 25.0);
        assert_eq!(config.orphans.leniency, 1.3);
        assert_eq!(config.orphans.max_wanting_clusters, 3);
        assert_eq!(config.duplicates.base_quantile, 0.9);
    }

    #[test]
    fn test_from_env_overrides() {
        std::env::set_var("QUORUM_MERGE_SIMILARITY_THRESHOLD", "0.9");
        std::env::set_var("QUORUM_MAX_WANTING_CLUSTERS", "5");
        let config = EngineConfig::from_env();
        std::env::remove_var("QUORUM_MERGE_SIMILARITY_THRESHOLD");
        std::env::remove_var("QUORUM_MAX_WANTING_CLUSTERS");

        assert_eq!(config.consensus.merge_similarity_threshold, 0.9);
        assert_eq!(config.orphans.max_wanting_clusters, 5);
        assert_eq!(config.consensus.intersection_threshold, 0.6);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"orphans": {"leniency": 1.5}}"#).unwrap();
        assert_eq!(config.orphans.leniency, 1.5);
        assert_eq!(config.orphans.max_wanting_clusters, 3);
        assert_eq!(config.condenser, CondenserConfig::default());
    }
}
