use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use super::types::{DuplicateMap, DuplicateReport, DuplicateType, OriginatingClusterMap};
use super::TARGET_DUPLICATES;
use crate::clustering::percentile;
use crate::config::DuplicateConfig;
use crate::errors::{QuorumError, Result};
use crate::vector::{Artifact, ArtifactId, SimilarityMatrix, SimilarityProvider};

/// Finds near-identical artifacts with a threshold calibrated per batch.
pub struct DuplicateDetector {
    config: DuplicateConfig,
    provider: Arc<dyn SimilarityProvider>,
}

impl DuplicateDetector {
    pub fn new(config: DuplicateConfig, provider: Arc<dyn SimilarityProvider>) -> Self {
        DuplicateDetector { config, provider }
    }

    /// Finds duplicate artifacts
    ///
    /// This function:
    /// 1. Computes the pairwise similarity matrix of the distinct artifacts
    /// 2. Derives a duplicate threshold from the score distribution
    /// 3. Links every pair reaching the threshold in a symmetric map
    /// 4. Keeps only intra- or inter-cluster links when asked to
    ///
    /// # Arguments
    /// * `artifacts` - Artifacts to compare; repeated ids are compared once
    /// * `duplicate_type` - Which links to keep relative to originating clusters
    /// * `originating_clusters` - Required for anything but [`DuplicateType::All`]
    ///
    /// # Returns
    /// * `Ok(DuplicateReport)` - Duplicate ids, their links and duplicate counts
    /// * `Err(MissingOriginMap)` - If classification was requested without an origin map
    /// * `Err` - If an embedding could not be produced
    pub fn get_duplicates(
        &self,
        artifacts: &[Artifact],
        duplicate_type: DuplicateType,
        originating_clusters: Option<&OriginatingClusterMap>,
    ) -> Result<DuplicateReport> {
        if duplicate_type != DuplicateType::All && originating_clusters.is_none() {
            return Err(QuorumError::MissingOriginMap(duplicate_type.to_string()));
        }

        let mut seen = HashSet::new();
        let distinct: Vec<&Artifact> = artifacts
            .iter()
            .filter(|artifact| seen.insert(artifact.id.as_str()))
            .collect();
        if distinct.len() <= 1 {
            return Ok(DuplicateReport::default());
        }

        let ids: Vec<ArtifactId> = distinct.iter().map(|a| a.id.clone()).collect();
        let matrix = self.provider.similarity_matrix(&ids, &ids)?;
        let threshold = self.threshold(&matrix);

        let mut duplicate_map = DuplicateMap::new();
        let mut exceedances = vec![0usize; ids.len()];
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                if matrix.get(i, j) >= threshold {
                    link(&mut duplicate_map, &ids[i], &ids[j]);
                    exceedances[i] += 1;
                    exceedances[j] += 1;
                }
            }
        }
        debug!(
            target: TARGET_DUPLICATES,
            "{} of {} artifacts have a duplicate at threshold {:.4}",
            duplicate_map.len(), ids.len(), threshold
        );

        if let Some(origins) = originating_clusters.filter(|_| duplicate_type != DuplicateType::All)
        {
            let lookup = origin_lookup(&distinct, origins);
            let same_origin = |a: &ArtifactId, b: &ArtifactId| shares_origin(&lookup, a, b);
            match duplicate_type {
                DuplicateType::IntraCluster => retain_edges(&mut duplicate_map, same_origin),
                DuplicateType::InterCluster => {
                    retain_edges(&mut duplicate_map, |a, b| !same_origin(a, b))
                }
                DuplicateType::All => {}
            }
        }

        // counts reflect every exceedance, including links dropped above
        let counts = duplicate_counts(&duplicate_map, &ids, &exceedances, &matrix);
        let report = DuplicateReport {
            duplicate_ids: duplicate_map.keys().cloned().collect(),
            duplicate_map,
            counts,
            threshold: Some(threshold),
        };
        info!(
            target: TARGET_DUPLICATES,
            "Found {} {} duplicates among {} artifacts",
            report.duplicate_ids.len(), duplicate_type, ids.len()
        );
        Ok(report)
    }

    /// Similarity a pair must reach to count as a duplicate
    ///
    /// With two artifacts there is a single score and no distribution, so the
    /// configured base threshold applies as is.
    pub fn threshold(&self, matrix: &SimilarityMatrix) -> f64 {
        if matrix.rows() <= 2 {
            return self.config.base_threshold;
        }

        let scores = matrix.upper_triangle();
        let base = percentile(&scores, self.config.base_quantile * 100.0)
            .unwrap_or(self.config.base_threshold);
        let outlier = outlier_threshold(&scores, self.config.sigma, self.config.epsilon);
        debug!(
            target: TARGET_DUPLICATES,
            "Duplicate threshold: quantile {:.4}, outlier {:.4}", base, outlier
        );
        base.max(outlier)
    }
}

/// Harmonic mean of the scores plus `sigma` standard deviations
///
/// Scores at or below zero are raised to `epsilon` before entering the
/// harmonic mean.
pub fn outlier_threshold(scores: &[f64], sigma: f64, epsilon: f64) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let n = scores.len() as f64;

    let reciprocal_sum: f64 = scores.iter().map(|s| 1.0 / s.max(epsilon)).sum();
    let harmonic_mean = n / reciprocal_sum;

    let mean = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;

    harmonic_mean + sigma * variance.sqrt()
}

fn link(map: &mut DuplicateMap, a: &ArtifactId, b: &ArtifactId) {
    map.entry(a.clone()).or_default().insert(b.clone());
    map.entry(b.clone()).or_default().insert(a.clone());
}

/// Drops edges failing `keep`, then artifacts left without duplicates
fn retain_edges<F>(map: &mut DuplicateMap, keep: F)
where
    F: Fn(&ArtifactId, &ArtifactId) -> bool,
{
    for (id, duplicates) in map.iter_mut() {
        duplicates.retain(|other| keep(id, other));
    }
    map.retain(|_, duplicates| !duplicates.is_empty());
}

/// Exceedance count plus mean similarity to every other artifact
///
/// Only artifacts still present in `map` get a count.
fn duplicate_counts(
    map: &DuplicateMap,
    ids: &[ArtifactId],
    exceedances: &[usize],
    matrix: &SimilarityMatrix,
) -> BTreeMap<ArtifactId, f64> {
    ids.iter()
        .enumerate()
        .filter(|(_, id)| map.contains_key(*id))
        .map(|(i, id)| {
            (
                id.clone(),
                exceedances[i] as f64 + matrix.mean_off_diagonal(i),
            )
        })
        .collect()
}

/// Originating cluster ids for each artifact, matched on verbatim content
pub(crate) fn origin_lookup(
    artifacts: &[&Artifact],
    origins: &OriginatingClusterMap,
) -> HashMap<ArtifactId, BTreeSet<String>> {
    artifacts
        .iter()
        .map(|artifact| {
            let clusters = origins
                .iter()
                .filter(|(_, contents)| contents.contains(&artifact.content))
                .map(|(cluster_id, _)| cluster_id.clone())
                .collect();
            (artifact.id.clone(), clusters)
        })
        .collect()
}

pub(crate) fn shares_origin(
    lookup: &HashMap<ArtifactId, BTreeSet<String>>,
    a: &ArtifactId,
    b: &ArtifactId,
) -> bool {
    match (lookup.get(a), lookup.get(b)) {
        (Some(left), Some(right)) => !left.is_disjoint(right),
        _ => false,
    }
}
