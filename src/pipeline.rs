//! End-to-end consensus run over a batch of artifacts.
//!
//! Raw clustering algorithms are independent of each other and run
//! concurrently on blocking tasks. Everything after that (condensing, voting,
//! orphan placement) is sequential.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::clustering::{
    labels_to_clusters, CandidateMap, ClusterId, ClusterMap, ClusteringAlgorithm, Condenser,
    ConsensusSnapshot, OrphanPlacer, RawClusteringAlgorithm,
};
use crate::config::EngineConfig;
use crate::duplicates::{
    classify_families, find_most_duplicated, DuplicateDetector, DuplicateFamily,
    DuplicateReport, DuplicateType, OriginatingClusterMap,
};
use crate::vector::{Artifact, ArtifactId, SimilarityProvider, Vector};
use crate::TARGET_PIPELINE;

/// Runs raw clustering, consensus and orphan placement against one provider.
pub struct ConsensusPipeline {
    config: EngineConfig,
    provider: Arc<dyn SimilarityProvider>,
}

impl ConsensusPipeline {
    pub fn new(config: EngineConfig, provider: Arc<dyn SimilarityProvider>) -> Self {
        ConsensusPipeline { config, provider }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs every algorithm over the artifacts and collects their candidates
    ///
    /// Candidates are keyed `"{algorithm}-{index}"` so that two configurations
    /// of the same algorithm do not collide.
    pub async fn partition(
        &self,
        artifact_ids: &[ArtifactId],
        algorithms: &[ClusteringAlgorithm],
        k_hint: usize,
    ) -> Result<CandidateMap> {
        let embeddings: Vec<Vector> = artifact_ids
            .iter()
            .map(|id| self.provider.embedding(id).map(|e| e.as_ref().clone()))
            .collect::<crate::Result<_>>()
            .context("Failed to load embeddings for partitioning")?;
        let embeddings = Arc::new(embeddings);

        let mut tasks = JoinSet::new();
        for (index, algorithm) in algorithms.iter().enumerate() {
            let algorithm = *algorithm;
            let embeddings = Arc::clone(&embeddings);
            tasks.spawn_blocking(move || {
                let key = format!("{}-{}", algorithm.name(), index);
                (key, algorithm.partition(&embeddings, k_hint))
            });
        }

        let mut candidates = CandidateMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (key, labels) = joined.context("Clustering task panicked")?;
            let labels = labels.with_context(|| format!("Algorithm {} failed", key))?;
            let clusters = labels_to_clusters(artifact_ids, &labels, &self.provider)
                .with_context(|| format!("Failed to build candidates from {}", key))?;
            info!(target: TARGET_PIPELINE, "{} proposed {} candidate clusters", key, clusters.len());
            candidates.insert(key, clusters);
        }

        Ok(candidates)
    }

    /// Produces the final consensus clusters for a batch of artifacts
    ///
    /// This function:
    /// 1. Partitions the artifacts with every algorithm concurrently
    /// 2. Condenses the candidates into voted consensus clusters
    /// 3. Places every artifact left out into a cluster
    pub async fn run(
        &self,
        artifact_ids: &[ArtifactId],
        algorithms: &[ClusteringAlgorithm],
        k_hint: usize,
    ) -> Result<ClusterMap> {
        let candidates = self.partition(artifact_ids, algorithms, k_hint).await?;

        let condenser = Condenser::new(self.config.condenser, self.config.consensus);
        let mut clusters = condenser
            .condense(candidates)
            .context("Failed to condense candidate clusters")?;

        let placer = OrphanPlacer::new(self.config.orphans, Arc::clone(&self.provider));
        let report = placer
            .place_orphans(&mut clusters, artifact_ids)
            .context("Failed to place orphans")?;

        info!(
            target: TARGET_PIPELINE,
            "Consensus run finished: {} clusters, {} orphans placed, {} singletons",
            clusters.len(), report.placed(), report.new_clusters.len()
        );
        Ok(clusters)
    }

    /// Like [`ConsensusPipeline::run`], returning an immutable snapshot
    pub async fn run_snapshot(
        &self,
        artifact_ids: &[ArtifactId],
        algorithms: &[ClusteringAlgorithm],
        k_hint: usize,
    ) -> Result<ConsensusSnapshot> {
        let clusters = self.run(artifact_ids, algorithms, k_hint).await?;
        Ok(ConsensusSnapshot::from_clusters(&clusters))
    }

    /// Finds duplicates inside each consensus cluster
    ///
    /// A cluster whose artifacts cannot be compared is logged and skipped so
    /// that one bad cluster does not abort the batch.
    pub fn duplicates_by_cluster(
        &self,
        clusters: &ClusterMap,
        artifacts: &BTreeMap<ArtifactId, Artifact>,
    ) -> BTreeMap<ClusterId, DuplicateReport> {
        let detector = DuplicateDetector::new(self.config.duplicates, Arc::clone(&self.provider));
        let mut reports = BTreeMap::new();

        for (id, cluster) in clusters {
            let members: Vec<Artifact> = cluster
                .artifact_ids()
                .iter()
                .filter_map(|artifact_id| artifacts.get(artifact_id).cloned())
                .collect();
            match detector.get_duplicates(&members, DuplicateType::All, None) {
                Ok(report) if !report.is_empty() => {
                    reports.insert(*id, report);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(target: TARGET_PIPELINE, "Skipping duplicate detection for cluster {}: {}", id, e);
                }
            }
        }

        reports
    }

    /// Duplicates to drop from a batch while keeping every family represented
    pub fn removable_duplicates(
        &self,
        artifacts: &[Artifact],
        duplicate_type: DuplicateType,
        originating_clusters: Option<&OriginatingClusterMap>,
    ) -> Result<Vec<ArtifactId>> {
        let detector = DuplicateDetector::new(self.config.duplicates, Arc::clone(&self.provider));
        let report = detector
            .get_duplicates(artifacts, duplicate_type, originating_clusters)
            .with_context(|| format!("Failed to find {} duplicates", duplicate_type))?;
        Ok(find_most_duplicated(&report.counts, &report.duplicate_map)
            .into_iter()
            .collect())
    }

    /// Groups every duplicate in a batch into named families
    ///
    /// Families whose links all stay inside one originating cluster are named
    /// after it, so that cluster can be regenerated downstream.
    pub fn duplicate_families(
        &self,
        artifacts: &[Artifact],
        originating_clusters: &OriginatingClusterMap,
    ) -> Result<Vec<DuplicateFamily>> {
        let detector = DuplicateDetector::new(self.config.duplicates, Arc::clone(&self.provider));
        let report = detector
            .get_duplicates(artifacts, DuplicateType::All, None)
            .context("Failed to find duplicates")?;
        let families = classify_families(&report.duplicate_map, artifacts, originating_clusters);
        info!(
            target: TARGET_PIPELINE,
            "{} duplicates form {} families", report.duplicate_ids.len(), families.len()
        );
        Ok(families)
    }
}
