use std::collections::{BTreeSet, HashSet, VecDeque};

use super::detector::{origin_lookup, shares_origin};
use super::naming::rename_cluster;
use super::types::{
    DuplicateCategory, DuplicateFamily, DuplicateMap, DuplicateType, OriginatingClusterMap,
};
use crate::vector::{Artifact, ArtifactId};

/// Connected components of the duplicate graph
///
/// Walks the graph breadth-first with an explicit queue, so large families do
/// not grow the call stack. Families come out ordered by their smallest id.
pub fn duplicate_families(duplicate_map: &DuplicateMap) -> Vec<BTreeSet<ArtifactId>> {
    let mut visited: HashSet<&ArtifactId> = HashSet::new();
    let mut families = Vec::new();

    for start in duplicate_map.keys() {
        if !visited.insert(start) {
            continue;
        }
        let mut family = BTreeSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            family.insert(current.clone());
            for next in duplicate_map.get(current).into_iter().flatten() {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        families.push(family);
    }

    families
}

/// Labels and names every duplicate family
///
/// A family whose links all stay inside one originating cluster is named after
/// that cluster with [`rename_cluster`]; other families are numbered in order.
///
/// # Arguments
/// * `duplicate_map` - Symmetric duplicate links
/// * `artifacts` - Artifacts in the map, used to look up their content
/// * `originating_clusters` - Upstream cluster -> content it produced
pub fn classify_families(
    duplicate_map: &DuplicateMap,
    artifacts: &[Artifact],
    originating_clusters: &OriginatingClusterMap,
) -> Vec<DuplicateFamily> {
    let refs: Vec<&Artifact> = artifacts.iter().collect();
    let lookup = origin_lookup(&refs, originating_clusters);

    duplicate_families(duplicate_map)
        .into_iter()
        .enumerate()
        .map(|(index, members)| {
            let mut intra = 0;
            let mut inter = 0;
            for id in &members {
                for other in duplicate_map.get(id).into_iter().flatten() {
                    if id < other {
                        if shares_origin(&lookup, id, other) {
                            intra += 1;
                        } else {
                            inter += 1;
                        }
                    }
                }
            }

            let category = match (intra, inter) {
                (_, 0) => DuplicateCategory::Intra,
                (0, _) => DuplicateCategory::Inter,
                _ => DuplicateCategory::Mixed,
            };

            let common_origin = members
                .iter()
                .map(|id| lookup.get(id).cloned().unwrap_or_default())
                .reduce(|acc, origins| acc.intersection(&origins).cloned().collect())
                .and_then(|origins| origins.into_iter().next());

            let name = match (category, common_origin) {
                (DuplicateCategory::Intra, Some(origin)) => {
                    rename_cluster(origin, DuplicateType::IntraCluster)
                }
                (DuplicateCategory::Inter, _) => rename_cluster(index, DuplicateType::InterCluster),
                _ => rename_cluster(index, DuplicateType::All),
            };

            DuplicateFamily {
                name,
                members,
                category,
            }
        })
        .collect()
}
