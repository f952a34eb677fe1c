use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

use super::cluster::Cluster;
use super::types::{ClusterId, ClusterMap};
use super::util::ClusterIdAllocator;
use super::TARGET_CONSENSUS;
use crate::config::ConsensusConfig;
use crate::errors::{QuorumError, Result};
use crate::vector::ArtifactId;

/// Reconciles candidate clusters proposed by several clustering algorithms.
///
/// Candidates must be added one at a time: each `add` reads and mutates vote
/// counts, stored membership and the set of seen artifacts.
#[derive(Debug)]
pub struct ConsensusMap {
    clusters: BTreeMap<ClusterId, Cluster>,
    seen: HashSet<ArtifactId>,
    ids: ClusterIdAllocator,
    config: ConsensusConfig,
}

impl Default for ConsensusMap {
    fn default() -> Self {
        Self::new(ConsensusConfig::default())
    }
}

impl ConsensusMap {
    pub fn new(config: ConsensusConfig) -> Self {
        ConsensusMap {
            clusters: BTreeMap::new(),
            seen: HashSet::new(),
            ids: ClusterIdAllocator::new(),
            config,
        }
    }

    /// Offers a candidate cluster to the map
    ///
    /// This function:
    /// 1. Measures how much of the candidate is new to the map
    /// 2. Adds a vote to every stored cluster the candidate overlaps enough
    /// 3. Merges the candidate into every stored cluster with a close centroid
    /// 4. Stores the candidate if it is novel or unmatched and was not merged
    ///
    /// Votes from step 2 are kept even when the candidate is merged or
    /// rejected, and one call may both vote on one cluster and merge into
    /// another.
    ///
    /// # Arguments
    /// * `candidate` - Proposed cluster
    ///
    /// # Returns
    /// * `Ok(Some(&Cluster))` - The candidate was stored as a new cluster
    /// * `Ok(None)` - The candidate was a duplicate or was merged
    /// * `Err` - If statistics could not be recomputed after a merge
    pub fn add(&mut self, candidate: Cluster) -> Result<Option<&Cluster>> {
        let new_count = candidate
            .artifact_ids()
            .iter()
            .filter(|id| !self.seen.contains(*id))
            .count();
        let new_ratio = new_count as f64 / candidate.len() as f64;
        let contains_new_artifacts = new_count > 0 && new_ratio >= self.config.new_artifact_ratio;
        let stale_singleton = candidate.len() == 1 && new_count == 0;

        let mut contains_cluster = false;
        for (id, stored) in self.clusters.iter_mut() {
            let overlap = overlap_score(&candidate, stored);
            if overlap >= self.config.intersection_threshold {
                stored.add_vote();
                contains_cluster = true;
                debug!(
                    target: TARGET_CONSENSUS,
                    "Candidate {} overlaps cluster {} ({:.3}), votes now {}",
                    candidate, id, overlap, stored.votes()
                );
            }
        }

        let mut merged = false;
        for (id, stored) in self.clusters.iter_mut() {
            let similarity = stored.similarity_to(&candidate)?;
            if similarity >= self.config.merge_similarity_threshold {
                stored.merge(candidate.clone())?;
                merged = true;
                debug!(
                    target: TARGET_CONSENSUS,
                    "Merged candidate {} into cluster {} (centroid similarity {:.3})",
                    candidate, id, similarity
                );
            }
        }
        if merged {
            self.seen.extend(candidate.artifact_ids().iter().cloned());
        }

        let accept = (contains_new_artifacts || !contains_cluster) && !merged && !stale_singleton;
        if !accept {
            debug!(
                target: TARGET_CONSENSUS,
                "Candidate {} not stored (new={}/{}, overlapping={}, merged={})",
                candidate, new_count, candidate.len(), contains_cluster, merged
            );
            return Ok(None);
        }

        let id = self.ids.allocate();
        self.seen.extend(candidate.artifact_ids().iter().cloned());
        self.clusters.insert(id, candidate);
        Ok(self.clusters.get(&id))
    }

    /// Swaps a stored cluster for another, carrying its votes over
    ///
    /// # Arguments
    /// * `old` - A cluster with the same members as the stored one to replace
    /// * `new` - The replacement
    ///
    /// # Returns
    /// * `Ok(ClusterId)` - The id under which `new` is now stored
    /// * `Err(NotFound)` - If no stored cluster has `old`'s members
    /// * `Err(Ambiguous)` - If several stored clusters have `old`'s members
    pub fn replace(&mut self, old: &Cluster, mut new: Cluster) -> Result<ClusterId> {
        let matches: Vec<ClusterId> = self
            .clusters
            .iter()
            .filter(|(_, stored)| *stored == old)
            .map(|(id, _)| *id)
            .collect();

        let id = match matches.as_slice() {
            [] => return Err(QuorumError::NotFound(old.to_string())),
            [id] => *id,
            _ => return Err(QuorumError::Ambiguous(matches.len())),
        };

        let Some(removed) = self.clusters.remove(&id) else {
            return Err(QuorumError::NotFound(old.to_string()));
        };
        for member in removed.artifact_ids() {
            if !self.clusters.values().any(|c| c.contains(member)) {
                self.seen.remove(member);
            }
        }

        new.set_votes(removed.votes());
        self.seen.extend(new.artifact_ids().iter().cloned());
        self.clusters.insert(id, new);
        Ok(id)
    }

    /// Clusters with at least `min_votes` votes, re-keyed densely from 0
    pub fn get_clusters(&self, min_votes: u32) -> ClusterMap {
        let clusters: ClusterMap = self
            .clusters
            .values()
            .filter(|cluster| cluster.votes() >= min_votes)
            .cloned()
            .enumerate()
            .collect();
        info!(
            target: TARGET_CONSENSUS,
            "{} of {} consensus clusters have at least {} votes",
            clusters.len(), self.clusters.len(), min_votes
        );
        clusters
    }

    /// Consuming variant of [`ConsensusMap::get_clusters`]
    pub fn into_clusters(self, min_votes: u32) -> ClusterMap {
        self.clusters
            .into_values()
            .filter(|cluster| cluster.votes() >= min_votes)
            .enumerate()
            .collect()
    }

    pub fn get(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ClusterId, &Cluster)> {
        self.clusters.iter()
    }

    pub fn seen(&self) -> &HashSet<ArtifactId> {
        &self.seen
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

/// Mean of the shares of each cluster covered by their intersection
///
/// `(|A∩B|/|A| + |A∩B|/|B|) / 2`
pub fn overlap_score(a: &Cluster, b: &Cluster) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection_len(b) as f64;
    (shared / a.len() as f64 + shared / b.len() as f64) / 2.0
}
