use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::cluster::Cluster;
use super::consensus::ConsensusMap;
use super::types::ClusterMap;
use super::util::percentile;
use super::TARGET_CONSENSUS;
use crate::config::{CondenserConfig, ConsensusConfig};
use crate::errors::Result;

/// Candidate clusters per algorithm: `{algorithm name -> {local id -> cluster}}`
pub type CandidateMap = BTreeMap<String, BTreeMap<usize, Cluster>>;

/// Filters and ranks candidate clusters before they are voted on.
#[derive(Debug, Clone, Default)]
pub struct Condenser {
    config: CondenserConfig,
    consensus: ConsensusConfig,
}

impl Condenser {
    pub fn new(config: CondenserConfig, consensus: ConsensusConfig) -> Self {
        Condenser { config, consensus }
    }

    /// Reduces every algorithm's candidates to one voted set of clusters
    ///
    /// This function:
    /// 1. Flattens the candidates of all algorithms
    /// 2. Keeps candidates within the size bounds, unless that would keep none
    /// 3. Derives the minimum acceptable pairwise cohesion
    /// 4. Feeds the surviving candidates to a [`ConsensusMap`], most cohesive first
    ///
    /// Singletons have no pairwise cohesion; they are fed after every
    /// multi-member candidate and only survive where they are wholly novel.
    ///
    /// # Arguments
    /// * `candidates` - Candidate clusters keyed by algorithm
    ///
    /// # Returns
    /// * `Ok(ClusterMap)` - Consensus clusters with at least `min_votes` votes
    /// * `Err` - If cluster statistics could not be computed
    pub fn condense(&self, candidates: CandidateMap) -> Result<ClusterMap> {
        let mut flattened: Vec<Cluster> = candidates
            .into_values()
            .flat_map(|clusters| clusters.into_values())
            .collect();
        for cluster in flattened.iter_mut() {
            cluster.ensure_stats()?;
        }
        let total = flattened.len();

        let filtered = self.filter_by_size(flattened);
        let (mut cohesive, singletons): (Vec<Cluster>, Vec<Cluster>) = filtered
            .into_iter()
            .partition(|cluster| cluster.avg_pairwise_sim().is_some());

        let cohesion: Vec<f64> = cohesive
            .iter()
            .filter_map(|cluster| cluster.avg_pairwise_sim())
            .collect();
        if let Some(threshold) = self.cohesion_threshold(&cohesion) {
            cohesive.retain(|cluster| cluster.avg_pairwise_sim().unwrap_or(0.0) >= threshold);
            info!(
                target: TARGET_CONSENSUS,
                "Cohesion threshold {:.3} keeps {} multi-member candidates", threshold, cohesive.len()
            );
        }
        cohesive.sort_by(|a, b| {
            let a = a.avg_pairwise_sim().unwrap_or(0.0);
            let b = b.avg_pairwise_sim().unwrap_or(0.0);
            b.total_cmp(&a)
        });

        let mut consensus = ConsensusMap::new(self.consensus);
        let mut accepted = 0;
        for candidate in cohesive.into_iter().chain(singletons) {
            if consensus.add(candidate)?.is_some() {
                accepted += 1;
            }
        }

        info!(
            target: TARGET_CONSENSUS,
            "Condensed {} candidates into {} consensus clusters", total, accepted
        );
        Ok(consensus.into_clusters(self.config.min_votes))
    }

    /// Keeps clusters within `[min_cluster_size, max_cluster_size]`
    ///
    /// Returns the input untouched when no cluster fits the bounds.
    pub fn filter_by_size(&self, clusters: Vec<Cluster>) -> Vec<Cluster> {
        let fits = |cluster: &Cluster| {
            cluster.len() >= self.config.min_cluster_size
                && cluster.len() <= self.config.max_cluster_size
        };
        if !clusters.iter().any(fits) {
            warn!(
                target: TARGET_CONSENSUS,
                "No candidate has between {} and {} members, skipping size filter",
                self.config.min_cluster_size, self.config.max_cluster_size
            );
            return clusters;
        }
        let before = clusters.len();
        let kept: Vec<Cluster> = clusters.into_iter().filter(|c| fits(c)).collect();
        debug!(
            target: TARGET_CONSENSUS,
            "Size filter kept {} of {} candidates", kept.len(), before
        );
        kept
    }

    /// Minimum pairwise cohesion a candidate needs
    ///
    /// The configured floor when any candidate reaches it, otherwise the
    /// configured low percentile of the candidates' own cohesion.
    pub fn cohesion_threshold(&self, cohesion: &[f64]) -> Option<f64> {
        if cohesion.iter().any(|c| *c >= self.config.cohesion_floor) {
            return Some(self.config.cohesion_floor);
        }
        percentile(cohesion, self.config.fallback_percentile)
    }
}
