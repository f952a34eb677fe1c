//! Raw clustering algorithms that propose candidate partitions.
//!
//! Each algorithm maps a set of embeddings to one integer label per vector.
//! Vectors labelled [`NOISE_LABEL`] belong to no candidate cluster.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::cluster::Cluster;
use super::TARGET_CONSENSUS;
use crate::errors::{QuorumError, Result};
use crate::vector::{cosine_similarity, ArtifactId, SimilarityProvider, Vector};

/// Label for vectors that belong to no cluster
pub const NOISE_LABEL: i64 = -1;

/// Partitions a set of embeddings into labelled groups.
pub trait RawClusteringAlgorithm: Send + Sync {
    /// Short name used to key this algorithm's candidates
    fn name(&self) -> &'static str;

    /// One label per input vector; `k_hint` is the suggested number of groups
    fn partition(&self, embeddings: &[Vector], k_hint: usize) -> Result<Vec<i64>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KMeansParams {
    pub max_iterations: usize,
    pub tolerance: f64,
    pub seed: u64,
}

impl Default for KMeansParams {
    fn default() -> Self {
        KMeansParams {
            max_iterations: 100,
            tolerance: 1e-4,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Linkage {
    Single,
    Complete,
    Average,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgglomerativeParams {
    pub linkage: Linkage,
    // Stop merging once the closest groups are further apart than this cosine distance
    pub distance_threshold: Option<f64>,
}

impl Default for AgglomerativeParams {
    fn default() -> Self {
        AgglomerativeParams {
            linkage: Linkage::Average,
            distance_threshold: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DbscanParams {
    // Neighbourhood radius as cosine distance
    pub eps: f64,
    pub min_points: usize,
}

impl Default for DbscanParams {
    fn default() -> Self {
        DbscanParams {
            eps: 0.25,
            min_points: 2,
        }
    }
}

/// The raw clustering algorithms the engine can run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ClusteringAlgorithm {
    KMeans(KMeansParams),
    Agglomerative(AgglomerativeParams),
    Dbscan(DbscanParams),
}

impl RawClusteringAlgorithm for ClusteringAlgorithm {
    fn name(&self) -> &'static str {
        match self {
            ClusteringAlgorithm::KMeans(_) => "kmeans",
            ClusteringAlgorithm::Agglomerative(_) => "agglomerative",
            ClusteringAlgorithm::Dbscan(_) => "dbscan",
        }
    }

    fn partition(&self, embeddings: &[Vector], k_hint: usize) -> Result<Vec<i64>> {
        if embeddings.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(first) = embeddings.first() {
            if let Some(bad) = embeddings.iter().find(|e| e.len() != first.len()) {
                return Err(QuorumError::DimensionMismatch {
                    expected: first.len(),
                    actual: bad.len(),
                });
            }
        }

        let labels = match self {
            ClusteringAlgorithm::KMeans(params) => kmeans(embeddings, k_hint, params)?,
            ClusteringAlgorithm::Agglomerative(params) => {
                agglomerative(embeddings, k_hint, params)
            }
            ClusteringAlgorithm::Dbscan(params) => dbscan(embeddings, params)?,
        };
        debug!(
            target: TARGET_CONSENSUS,
            "{} labelled {} embeddings", self.name(), labels.len()
        );
        Ok(labels)
    }
}

/// Groups artifact ids by label into candidate clusters
///
/// Noise labels are skipped. Local ids follow the order in which labels first
/// appear.
pub fn labels_to_clusters(
    ids: &[ArtifactId],
    labels: &[i64],
    provider: &Arc<dyn SimilarityProvider>,
) -> Result<BTreeMap<usize, Cluster>> {
    if ids.len() != labels.len() {
        return Err(QuorumError::Partition(format!(
            "{} labels for {} artifacts",
            labels.len(),
            ids.len()
        )));
    }

    let mut order: Vec<i64> = Vec::new();
    let mut groups: BTreeMap<i64, Vec<ArtifactId>> = BTreeMap::new();
    for (id, label) in ids.iter().zip(labels.iter()) {
        if *label == NOISE_LABEL {
            continue;
        }
        let members = groups.entry(*label).or_insert_with(|| {
            order.push(*label);
            Vec::new()
        });
        members.push(id.clone());
    }

    let mut clusters = BTreeMap::new();
    for (local_id, label) in order.into_iter().enumerate() {
        if let Some(members) = groups.remove(&label) {
            clusters.insert(local_id, Cluster::new(members, Arc::clone(provider))?);
        }
    }
    Ok(clusters)
}

fn euclidean_distance_squared(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum()
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    1.0 - cosine_similarity(a, b)
}

/// Lloyd's k-means with seeded k-means++ initialisation
fn kmeans(embeddings: &[Vector], k_hint: usize, params: &KMeansParams) -> Result<Vec<i64>> {
    let n = embeddings.len();
    let k = k_hint.clamp(1, n);
    if params.max_iterations == 0 {
        return Err(QuorumError::InvalidParameter(
            "k-means needs at least one iteration".to_string(),
        ));
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut centroids = kmeans_plus_plus_init(embeddings, k, &mut rng);
    let mut assignments = vec![0usize; n];

    for iteration in 0..params.max_iterations {
        for (i, vector) in embeddings.iter().enumerate() {
            let mut best = 0;
            let mut best_distance = f64::MAX;
            for (j, centroid) in centroids.iter().enumerate() {
                let distance = euclidean_distance_squared(vector, centroid);
                if distance < best_distance {
                    best_distance = distance;
                    best = j;
                }
            }
            assignments[i] = best;
        }

        let updated = recompute_centroids(embeddings, &assignments, &centroids);
        let movement = centroids
            .iter()
            .zip(updated.iter())
            .map(|(old, new)| euclidean_distance_squared(old, new).sqrt())
            .fold(0.0f64, f64::max);
        centroids = updated;

        if movement < params.tolerance {
            debug!(
                target: TARGET_CONSENSUS,
                "k-means converged after {} iterations", iteration + 1
            );
            break;
        }
    }

    Ok(assignments.into_iter().map(|a| a as i64).collect())
}

/// Picks initial centroids with probability proportional to squared distance
fn kmeans_plus_plus_init(embeddings: &[Vector], k: usize, rng: &mut StdRng) -> Vec<Vector> {
    let n = embeddings.len();
    let mut centroids = Vec::with_capacity(k);
    centroids.push(embeddings[rng.random_range(0..n)].clone());

    let mut min_distances = vec![f64::MAX; n];
    while centroids.len() < k {
        if let Some(last) = centroids.last() {
            for (i, vector) in embeddings.iter().enumerate() {
                let distance = euclidean_distance_squared(vector, last);
                if distance < min_distances[i] {
                    min_distances[i] = distance;
                }
            }
        }

        let total: f64 = min_distances.iter().sum();
        if total <= 0.0 {
            // every point already sits on a centroid
            centroids.push(embeddings[centroids.len() % n].clone());
            continue;
        }

        let mut target = rng.random::<f64>() * total;
        let mut chosen = n - 1;
        for (i, distance) in min_distances.iter().enumerate() {
            if target < *distance {
                chosen = i;
                break;
            }
            target -= distance;
        }
        centroids.push(embeddings[chosen].clone());
    }

    centroids
}

/// Mean of each group's members; empty groups keep their previous centroid
fn recompute_centroids(
    embeddings: &[Vector],
    assignments: &[usize],
    previous: &[Vector],
) -> Vec<Vector> {
    let dimensions = embeddings[0].len();
    let mut sums = vec![vec![0.0f64; dimensions]; previous.len()];
    let mut counts = vec![0usize; previous.len()];

    for (vector, &group) in embeddings.iter().zip(assignments.iter()) {
        counts[group] += 1;
        for (sum, value) in sums[group].iter_mut().zip(vector.iter()) {
            *sum += f64::from(*value);
        }
    }

    sums.into_iter()
        .zip(counts)
        .zip(previous.iter())
        .map(|((sum, count), old)| {
            if count == 0 {
                old.clone()
            } else {
                sum.into_iter().map(|s| (s / count as f64) as f32).collect()
            }
        })
        .collect()
}

/// Bottom-up merging of the closest groups by cosine distance
fn agglomerative(embeddings: &[Vector], k_hint: usize, params: &AgglomerativeParams) -> Vec<i64> {
    let n = embeddings.len();
    let target = k_hint.clamp(1, n);

    let mut distances = vec![vec![0.0f64; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = cosine_distance(&embeddings[i], &embeddings[j]);
            distances[i][j] = d;
            distances[j][i] = d;
        }
    }

    let mut groups: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
    while groups.len() > target {
        let mut best: Option<(usize, usize, f64)> = None;
        for a in 0..groups.len() {
            for b in (a + 1)..groups.len() {
                let d = linkage_distance(&groups[a], &groups[b], &distances, params.linkage);
                if best.map_or(true, |(_, _, current)| d < current) {
                    best = Some((a, b, d));
                }
            }
        }

        let Some((a, b, distance)) = best else {
            break;
        };
        if params
            .distance_threshold
            .is_some_and(|threshold| distance > threshold)
        {
            break;
        }
        let absorbed = groups.remove(b);
        groups[a].extend(absorbed);
    }

    let mut labels = vec![NOISE_LABEL; n];
    for (label, members) in groups.iter().enumerate() {
        for &member in members {
            labels[member] = label as i64;
        }
    }
    labels
}

fn linkage_distance(a: &[usize], b: &[usize], distances: &[Vec<f64>], linkage: Linkage) -> f64 {
    let pairs = a
        .iter()
        .flat_map(|&i| b.iter().map(move |&j| distances[i][j]));
    match linkage {
        Linkage::Single => pairs.fold(f64::MAX, f64::min),
        Linkage::Complete => pairs.fold(0.0, f64::max),
        Linkage::Average => {
            let total: f64 = pairs.sum();
            total / (a.len() * b.len()) as f64
        }
    }
}

/// Density-based clustering; sparse points are labelled as noise
fn dbscan(embeddings: &[Vector], params: &DbscanParams) -> Result<Vec<i64>> {
    if params.eps <= 0.0 || params.min_points == 0 {
        return Err(QuorumError::InvalidParameter(format!(
            "dbscan needs eps > 0 and min_points > 0, got eps={} min_points={}",
            params.eps, params.min_points
        )));
    }

    let n = embeddings.len();
    let neighbours = |i: usize| -> Vec<usize> {
        (0..n)
            .filter(|&j| cosine_distance(&embeddings[i], &embeddings[j]) <= params.eps)
            .collect()
    };

    let mut labels: Vec<Option<i64>> = vec![None; n];
    let mut next_label = 0i64;

    for i in 0..n {
        if labels[i].is_some() {
            continue;
        }
        let seeds = neighbours(i);
        if seeds.len() < params.min_points {
            labels[i] = Some(NOISE_LABEL);
            continue;
        }

        let label = next_label;
        next_label += 1;
        labels[i] = Some(label);

        let mut queue = seeds;
        while let Some(j) = queue.pop() {
            match labels[j] {
                Some(NOISE_LABEL) => labels[j] = Some(label),
                Some(_) => continue,
                None => {
                    labels[j] = Some(label);
                    let expansion = neighbours(j);
                    if expansion.len() >= params.min_points {
                        queue.extend(expansion);
                    }
                }
            }
        }
    }

    Ok(labels
        .into_iter()
        .map(|label| label.unwrap_or(NOISE_LABEL))
        .collect())
}
