use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::types::{ClusterId, ClusterSnapshot, ClusterStats};
use crate::errors::{QuorumError, Result};
use crate::vector::{cosine_similarity, ArtifactId, SimilarityProvider, Vector};

/// A group of artifacts with derived cohesion statistics.
///
/// Members keep their insertion order and are never duplicated. The centroid
/// and statistics are `None` whenever membership changed without a recompute.
/// Clusters compare equal when they hold the same set of artifacts.
#[derive(Clone)]
pub struct Cluster {
    artifact_ids: Vec<ArtifactId>,
    members: HashSet<ArtifactId>,
    votes: u32,
    centroid: Option<Vector>,
    stats: Option<ClusterStats>,
    provider: Arc<dyn SimilarityProvider>,
}

impl Cluster {
    /// Creates a cluster and computes its statistics
    ///
    /// # Arguments
    /// * `ids` - Member artifact ids; repeats are dropped, first occurrence wins
    /// * `provider` - Source of member embeddings
    ///
    /// # Returns
    /// * `Ok(Cluster)` - The new cluster with one vote
    /// * `Err(EmptyCluster)` - If `ids` is empty
    pub fn new<I, S>(ids: I, provider: Arc<dyn SimilarityProvider>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<ArtifactId>,
    {
        let mut cluster = Cluster {
            artifact_ids: Vec::new(),
            members: HashSet::new(),
            votes: 1,
            centroid: None,
            stats: None,
            provider,
        };
        for id in ids {
            cluster.insert_member(id.into());
        }
        if cluster.artifact_ids.is_empty() {
            return Err(QuorumError::EmptyCluster);
        }
        cluster.recompute_stats()?;
        Ok(cluster)
    }

    pub fn artifact_ids(&self) -> &[ArtifactId] {
        &self.artifact_ids
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.artifact_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifact_ids.is_empty()
    }

    pub fn votes(&self) -> u32 {
        self.votes
    }

    pub(crate) fn add_vote(&mut self) {
        self.votes += 1;
    }

    pub(crate) fn set_votes(&mut self, votes: u32) {
        self.votes = votes.max(1);
    }

    pub fn centroid(&self) -> Option<&[f32]> {
        self.centroid.as_deref()
    }

    pub fn stats(&self) -> Option<&ClusterStats> {
        self.stats.as_ref()
    }

    pub fn avg_similarity(&self) -> Option<f64> {
        self.stats.map(|s| s.avg_similarity)
    }

    pub fn min_sim(&self) -> Option<f64> {
        self.stats.and_then(|s| s.min_sim)
    }

    pub fn max_sim(&self) -> Option<f64> {
        self.stats.and_then(|s| s.max_sim)
    }

    pub fn avg_pairwise_sim(&self) -> Option<f64> {
        self.stats.and_then(|s| s.avg_pairwise_sim)
    }

    /// Number of members shared with another cluster
    pub fn intersection_len(&self, other: &Cluster) -> usize {
        let (small, large) = if self.members.len() <= other.members.len() {
            (&self.members, &other.members)
        } else {
            (&other.members, &self.members)
        };
        small.iter().filter(|id| large.contains(*id)).count()
    }

    /// Adds one artifact
    ///
    /// # Arguments
    /// * `id` - Artifact to add; a no-op if already a member
    /// * `update_stats` - Recompute statistics now, or leave them invalidated
    ///
    /// # Returns
    /// * `Ok(true)` - The artifact was added
    /// * `Ok(false)` - The artifact was already a member
    pub fn add(&mut self, id: impl Into<ArtifactId>, update_stats: bool) -> Result<bool> {
        let added = self.insert_member(id.into());
        if added {
            self.after_mutation(update_stats)?;
        }
        Ok(added)
    }

    /// Adds several artifacts, returning how many were new
    pub fn add_all<I, S>(&mut self, ids: I, update_stats: bool) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: Into<ArtifactId>,
    {
        let added = ids
            .into_iter()
            .map(|id| self.insert_member(id.into()))
            .filter(|added| *added)
            .count();
        if added > 0 {
            self.after_mutation(update_stats)?;
        }
        Ok(added)
    }

    /// Cosine similarity between this cluster's centroid and another's
    pub fn similarity_to(&self, other: &Cluster) -> Result<f64> {
        let mine = self.current_centroid()?;
        let theirs = other.current_centroid()?;
        Ok(cosine_similarity(&mine, &theirs))
    }

    /// Cosine similarity between this cluster's centroid and an arbitrary vector
    pub fn similarity_to_vector(&self, vector: &[f32]) -> Result<f64> {
        let mine = self.current_centroid()?;
        Ok(cosine_similarity(&mine, vector))
    }

    /// Average similarity of `id` to every other member
    ///
    /// A lone member is treated as maximally similar to its neighbors and
    /// scores `1.0`.
    pub fn similarity_to_neighbors(&self, id: &str) -> Result<f64> {
        let neighbors: Vec<&ArtifactId> =
            self.artifact_ids.iter().filter(|other| *other != id).collect();
        if neighbors.is_empty() {
            return Ok(1.0);
        }

        let embedding = self.provider.embedding(id)?;
        let mut total = 0.0;
        for neighbor in &neighbors {
            let other = self.provider.embedding(neighbor)?;
            total += cosine_similarity(&embedding, &other);
        }
        Ok(total / neighbors.len() as f64)
    }

    /// Recomputes the centroid and all cohesion statistics
    ///
    /// Pairwise statistics cover the unique unordered member pairs only and are
    /// left undefined for singletons.
    pub fn recompute_stats(&mut self) -> Result<()> {
        if self.artifact_ids.is_empty() {
            return Err(QuorumError::EmptyCluster);
        }

        let centroid = self.provider.centroid(&self.artifact_ids)?;

        let mut centroid_total = 0.0;
        for id in &self.artifact_ids {
            let embedding = self.provider.embedding(id)?;
            centroid_total += cosine_similarity(&centroid, &embedding);
        }
        let avg_similarity = centroid_total / self.artifact_ids.len() as f64;

        let (min_sim, max_sim, avg_pairwise_sim) = if self.artifact_ids.len() > 1 {
            let matrix = self
                .provider
                .similarity_matrix(&self.artifact_ids, &self.artifact_ids)?;
            let pairs = matrix.upper_triangle();
            let min = pairs.iter().copied().fold(f64::INFINITY, f64::min);
            let max = pairs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let avg = pairs.iter().sum::<f64>() / pairs.len() as f64;
            (Some(min), Some(max), Some(avg))
        } else {
            (None, None, None)
        };

        self.centroid = Some(centroid);
        self.stats = Some(ClusterStats {
            avg_similarity,
            min_sim,
            max_sim,
            avg_pairwise_sim,
        });
        Ok(())
    }

    /// Recomputes statistics only if a deferred mutation left them stale
    pub fn ensure_stats(&mut self) -> Result<()> {
        if self.stats.is_none() || self.centroid.is_none() {
            self.recompute_stats()?;
        }
        Ok(())
    }

    /// Absorbs another cluster, summing votes
    ///
    /// `other` is consumed; its members are appended in their own order.
    pub fn merge(&mut self, other: Cluster) -> Result<()> {
        for id in other.artifact_ids {
            self.insert_member(id);
        }
        self.votes += other.votes;
        self.recompute_stats()
    }

    /// Immutable copy of membership, votes and statistics
    pub fn snapshot(&self, id: ClusterId) -> ClusterSnapshot {
        ClusterSnapshot {
            id,
            artifact_ids: self.artifact_ids.clone(),
            votes: self.votes,
            stats: self.stats,
        }
    }

    fn insert_member(&mut self, id: ArtifactId) -> bool {
        if self.members.contains(&id) {
            return false;
        }
        self.members.insert(id.clone());
        self.artifact_ids.push(id);
        true
    }

    fn after_mutation(&mut self, update_stats: bool) -> Result<()> {
        if update_stats {
            self.recompute_stats()
        } else {
            self.centroid = None;
            self.stats = None;
            Ok(())
        }
    }

    fn current_centroid(&self) -> Result<Vector> {
        match &self.centroid {
            Some(centroid) => Ok(centroid.clone()),
            None => self.provider.centroid(&self.artifact_ids),
        }
    }
}

impl PartialEq for Cluster {
    fn eq(&self, other: &Self) -> bool {
        self.members == other.members
    }
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("artifact_ids", &self.artifact_ids)
            .field("votes", &self.votes)
            .field("stats", &self.stats)
            .finish()
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.artifact_ids.join(", "))
    }
}
