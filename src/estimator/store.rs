use super::EstimatorStrategy;

/// Backing store of a Space-Saving histogram.
///
/// Implementations differ only in how they locate the minimum counter. The
/// minimum is always the smallest `(count, key)` pair, so every store evicts
/// the same entry for the same history.
pub trait CounterStore: Send + Sync {
    fn strategy(&self) -> EstimatorStrategy;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds one to `key` if tracked. Returns false when the key is unknown.
    fn increment(&mut self, key: u32) -> bool;

    /// Starts tracking `key` with `count`. The key must not be tracked yet.
    fn insert(&mut self, key: u32, count: u64);

    /// Removes and returns the minimum `(key, count)` entry.
    fn pop_min(&mut self) -> Option<(u32, u64)>;

    /// All tracked `(key, count)` pairs in unspecified order.
    fn entries(&self) -> Vec<(u32, u64)>;
}
