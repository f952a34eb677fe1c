use std::fmt::Display;

use super::types::DuplicateType;
use crate::errors::{QuorumError, Result};

const DUPLICATE_PREFIX: &str = "r-";

/// Name of the duplicate cluster derived from upstream cluster `cluster_id`
///
/// Always `r-{cluster_id}-{type}`.
pub fn rename_cluster(cluster_id: impl Display, duplicate_type: DuplicateType) -> String {
    format!("{}{}-{}", DUPLICATE_PREFIX, cluster_id, duplicate_type.value())
}

/// Upstream cluster id behind an intra-cluster duplicate name
///
/// Only intra-cluster names map back to a single cluster.
///
/// # Returns
/// * `Ok(String)` - The original cluster id
/// * `Err(InvalidName)` - If the name is not an intra-cluster duplicate name
pub fn identify_original_cluster(name: &str) -> Result<String> {
    let suffix = format!("-{}", DuplicateType::IntraCluster.value());
    name.strip_prefix(DUPLICATE_PREFIX)
        .and_then(|rest| rest.strip_suffix(suffix.as_str()))
        .map(str::to_string)
        .ok_or_else(|| QuorumError::InvalidName(name.to_string()))
}
