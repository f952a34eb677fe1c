pub mod detector;
pub mod families;
pub mod naming;
pub mod selection;
#[cfg(test)]
mod tests;
pub mod types;

pub use detector::DuplicateDetector;
pub use families::{classify_families, duplicate_families};
pub use naming::{identify_original_cluster, rename_cluster};
pub use selection::{can_be_removed, find_most_duplicated};
pub use types::*;

pub const TARGET_DUPLICATES: &str = "duplicates";

/// Quantile of pair scores used as the starting threshold
pub const DUPLICATE_BASE_QUANTILE: f64 = 0.9;

/// Threshold used directly when there are too few artifacts for a distribution
pub const DUPLICATE_BASE_THRESHOLD: f64 = 0.9;

/// Standard deviations above the harmonic mean that mark an outlier pair
pub const DUPLICATE_SIGMA: f64 = 1.5;

/// Floor for scores entering the harmonic mean
pub const SIMILARITY_EPSILON: f64 = 1e-6;
