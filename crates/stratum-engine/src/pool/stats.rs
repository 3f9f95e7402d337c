/// Cumulative pool counters.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct PoolStats {
    /// Surfaces allocated from scratch.
    pub created: u64,
    /// Acquisitions satisfied by an exact-size available surface.
    pub reused_exact: u64,
    /// Acquisitions satisfied by rebinding a larger allocation.
    pub reused_best_fit: u64,
    /// Best-fit rebinds that failed and fell back to creation.
    pub rebind_failures: u64,
    /// Acquisitions that produced nothing.
    pub acquire_failures: u64,
    /// Available surfaces discarded by aging (too old or invalid).
    pub evicted: u64,
    /// Oversized surfaces replaced by exact-sized ones.
    pub compacted: u64,
    /// Recycled surfaces destroyed because the available list was full.
    pub capacity_drops: u64,
    /// Invalid surfaces dropped on submit or recycle.
    pub invalid_drops: u64,
}

impl PoolStats {
    /// Acquisitions that avoided a new allocation.
    pub fn reused(&self) -> u64 {
        self.reused_exact + self.reused_best_fit
    }
}
