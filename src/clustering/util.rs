use super::types::ClusterId;

/// Hands out cluster ids that are never reused, even after removals
#[derive(Debug, Clone, Default)]
pub struct ClusterIdAllocator {
    next: ClusterId,
}

impl ClusterIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts allocating at `next`, e.g. one past the largest id already in use
    pub fn starting_at(next: ClusterId) -> Self {
        ClusterIdAllocator { next }
    }

    pub fn allocate(&mut self) -> ClusterId {
        let id = self.next;
        self.next += 1;
        id
    }

    pub fn peek(&self) -> ClusterId {
        self.next
    }
}

/// Percentile of a set of values using linear interpolation between ranks
///
/// # Arguments
/// * `values` - Unsorted sample
/// * `p` - Percentile in `[0, 100]`; clamped if outside
///
/// # Returns
/// * `Some(f64)` - The interpolated value
/// * `None` - If `values` is empty
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    if sorted.len() == 1 {
        return Some(sorted[0]);
    }

    // index = p/100 * (n-1)
    let rank = p.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}
