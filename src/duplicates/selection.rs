use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::types::DuplicateMap;
use super::TARGET_DUPLICATES;
use crate::vector::ArtifactId;

/// Greedily picks duplicates to remove, most duplicated first
///
/// An artifact is skipped when all of its duplicates are already selected, and
/// refused when removing it would strip an already-selected duplicate of its
/// last surviving partner. Every duplicate family therefore keeps at least one
/// member. The result depends on processing order and is not a minimum cover.
///
/// # Arguments
/// * `counts` - Duplicate weight per artifact; missing entries weigh zero
/// * `duplicate_map` - Symmetric duplicate links
///
/// # Returns
/// * The artifacts selected for removal
pub fn find_most_duplicated(
    counts: &BTreeMap<ArtifactId, f64>,
    duplicate_map: &DuplicateMap,
) -> BTreeSet<ArtifactId> {
    let mut order: Vec<(&ArtifactId, f64)> = duplicate_map
        .keys()
        .map(|id| (id, counts.get(id).copied().unwrap_or(0.0)))
        .collect();
    order.sort_by(|(a_id, a), (b_id, b)| b.total_cmp(a).then_with(|| a_id.cmp(b_id)));

    let mut removed = BTreeSet::new();
    for (id, _) in order {
        let Some(duplicates) = duplicate_map.get(id) else {
            continue;
        };
        if duplicates.is_empty() || duplicates.iter().all(|d| removed.contains(d)) {
            continue;
        }
        if can_be_removed(id, duplicate_map, &removed) {
            removed.insert(id.clone());
        }
    }

    debug!(
        target: TARGET_DUPLICATES,
        "Selected {} of {} duplicated artifacts for removal",
        removed.len(), duplicate_map.len()
    );
    removed
}

/// Whether `candidate` can go without leaving a removed duplicate orphaned
///
/// Refuses when some already-removed duplicate of `candidate` has exactly one
/// duplicate left that is not removed, which must be `candidate` itself.
pub fn can_be_removed(
    candidate: &ArtifactId,
    duplicate_map: &DuplicateMap,
    removed: &BTreeSet<ArtifactId>,
) -> bool {
    let Some(duplicates) = duplicate_map.get(candidate) else {
        return true;
    };
    duplicates
        .iter()
        .filter(|d| removed.contains(*d))
        .all(|d| {
            let remaining = duplicate_map
                .get(d)
                .map_or(0, |others| others.iter().filter(|o| !removed.contains(*o)).count());
            remaining != 1
        })
}
