use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use super::cluster::Cluster;
use super::types::{ClusterId, ClusterMap};
use super::util::ClusterIdAllocator;
use super::TARGET_ORPHANS;
use crate::config::OrphanConfig;
use crate::errors::Result;
use crate::vector::{ArtifactId, SimilarityProvider};

/// Outcome of one orphan placement pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlacementReport {
    // Orphan -> clusters it was added to (a fresh singleton counts too)
    pub assignments: BTreeMap<ArtifactId, Vec<ClusterId>>,

    // Ids of singleton clusters created for orphans nobody wanted
    pub new_clusters: Vec<ClusterId>,
}

impl PlacementReport {
    /// Orphans that joined existing clusters
    pub fn placed(&self) -> usize {
        self.assignments.len() - self.new_clusters.len()
    }
}

/// Assigns artifacts left out of every consensus cluster.
pub struct OrphanPlacer {
    config: OrphanConfig,
    provider: Arc<dyn SimilarityProvider>,
}

impl OrphanPlacer {
    pub fn new(config: OrphanConfig, provider: Arc<dyn SimilarityProvider>) -> Self {
        OrphanPlacer { config, provider }
    }

    /// Places every orphan into wanting clusters or a new singleton
    ///
    /// Orphans are handled one after another, and each one sees the
    /// centroids as left by the previous placements.
    ///
    /// # Arguments
    /// * `clusters` - Consensus clusters, extended in place
    /// * `all_artifacts` - Every artifact id that must end up in a cluster
    ///
    /// # Returns
    /// * `Ok(PlacementReport)` - Where each orphan went
    /// * `Err` - If an embedding was missing or statistics could not be computed
    pub fn place_orphans(
        &self,
        clusters: &mut ClusterMap,
        all_artifacts: &[ArtifactId],
    ) -> Result<PlacementReport> {
        let clustered: HashSet<ArtifactId> = clusters
            .values()
            .flat_map(|cluster| cluster.artifact_ids().iter().cloned())
            .collect();
        let mut pending = HashSet::new();
        let orphans: Vec<&ArtifactId> = all_artifacts
            .iter()
            .filter(|id| !clustered.contains(*id) && pending.insert(*id))
            .collect();

        for cluster in clusters.values_mut() {
            cluster.ensure_stats()?;
        }

        let mut ids = ClusterIdAllocator::starting_at(
            clusters.keys().next_back().map_or(0, |last| last + 1),
        );
        info!(
            target: TARGET_ORPHANS,
            "Placing {} orphans across {} clusters, new singletons start at id {}",
            orphans.len(), clusters.len(), ids.peek()
        );
        let mut report = PlacementReport::default();

        for orphan in orphans {
            let wanting = self.wanting_clusters(clusters, orphan)?;

            if (1..=self.config.max_wanting_clusters).contains(&wanting.len()) {
                for id in &wanting {
                    if let Some(cluster) = clusters.get_mut(id) {
                        cluster.add(orphan.clone(), true)?;
                    }
                }
                debug!(
                    target: TARGET_ORPHANS,
                    "Orphan {} joined clusters {:?}", orphan, wanting
                );
                report.assignments.insert(orphan.clone(), wanting);
            } else {
                let id = ids.allocate();
                let singleton = Cluster::new([orphan.clone()], Arc::clone(&self.provider))?;
                clusters.insert(id, singleton);
                debug!(
                    target: TARGET_ORPHANS,
                    "Orphan {} wanted by {} clusters, created singleton {}",
                    orphan, wanting.len(), id
                );
                report.assignments.insert(orphan.clone(), vec![id]);
                report.new_clusters.push(id);
            }
        }

        info!(
            target: TARGET_ORPHANS,
            "Placed {} orphans into existing clusters, created {} singletons",
            report.placed(), report.new_clusters.len()
        );
        Ok(report)
    }

    /// Clusters that would accept the orphan given their current centroids
    ///
    /// A cluster wants an orphan when the orphan is more similar to its
    /// centroid than the members are on average, scaled down by the leniency.
    /// A cluster with stale statistics falls back to a cohesion of zero.
    pub fn wanting_clusters(&self, clusters: &ClusterMap, orphan: &str) -> Result<Vec<ClusterId>> {
        let embedding = self.provider.embedding(orphan)?;
        let mut wanting = Vec::new();
        for (id, cluster) in clusters {
            let cohesion = cluster.avg_similarity().unwrap_or(0.0);
            let similarity = cluster.similarity_to_vector(&embedding)?;
            if cohesion / self.config.leniency - similarity < 0.0 {
                wanting.push(*id);
            }
        }
        Ok(wanting)
    }
}
