//! Space-Saving top-k frequency estimation.
//!
//! Reference: Metwally A. et al., "Efficient Computation of Frequent and
//! Top-k Elements in Data Streams".

pub mod heap;
pub mod heavy_hitters;
pub mod linear;
pub mod sorted;
pub mod store;

pub use heap::MinHeapStore;
pub use heavy_hitters::HeavyHitterSet;
pub use linear::LinearScanStore;
pub use sorted::SortedSetStore;
pub use store::CounterStore;

use crate::core::{JoinError, Result, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Backing store used to find and replace the minimum counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorStrategy {
    /// O(k) scan per eviction
    #[default]
    LinearScan,
    /// O(log k) eviction, lazily invalidated heap entries
    MinHeap,
    /// O(log k) eviction and increment
    SortedSet,
}

impl EstimatorStrategy {
    pub const ALL: [EstimatorStrategy; 3] = [
        EstimatorStrategy::LinearScan,
        EstimatorStrategy::MinHeap,
        EstimatorStrategy::SortedSet,
    ];

    pub fn new_store(self, k: usize) -> Box<dyn CounterStore> {
        match self {
            EstimatorStrategy::LinearScan => Box::new(LinearScanStore::with_capacity(k)),
            EstimatorStrategy::MinHeap => Box::new(MinHeapStore::with_capacity(k)),
            EstimatorStrategy::SortedSet => Box::new(SortedSetStore::with_capacity(k)),
        }
    }
}

impl fmt::Display for EstimatorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EstimatorStrategy::LinearScan => "linear_scan",
            EstimatorStrategy::MinHeap => "min_heap",
            EstimatorStrategy::SortedSet => "sorted_set",
        };
        f.write_str(name)
    }
}

impl FromStr for EstimatorStrategy {
    type Err = JoinError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "linear_scan" | "linear" | "hash_table_only" => Ok(EstimatorStrategy::LinearScan),
            "min_heap" | "heap" => Ok(EstimatorStrategy::MinHeap),
            "sorted_set" | "sorted" | "sorted_array" => Ok(EstimatorStrategy::SortedSet),
            other => Err(JoinError::Config(format!(
                "unknown estimator strategy '{}'",
                other
            ))),
        }
    }
}

/// A tracked key with its estimated count and frequency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyFrequency {
    pub key: u32,
    pub count: u64,
    pub frequency: f64,
}

/// Bounded-memory approximate top-k counter.
pub struct SpaceSaving {
    k: usize,
    total_seen: u64,
    store: Box<dyn CounterStore>,
}

impl SpaceSaving {
    pub fn new(k: usize, strategy: EstimatorStrategy) -> Result<Self> {
        if k == 0 {
            return Err(JoinError::Config(
                "Space-Saving capacity k must be > 0".to_string(),
            ));
        }
        Ok(Self {
            k,
            total_seen: 0,
            store: strategy.new_store(k),
        })
    }

    pub fn capacity(&self) -> usize {
        self.k
    }

    pub fn strategy(&self) -> EstimatorStrategy {
        self.store.strategy()
    }

    pub fn total_seen(&self) -> u64 {
        self.total_seen
    }

    pub fn tracked(&self) -> usize {
        self.store.len()
    }

    pub fn observe(&mut self, key: u32) {
        self.total_seen += 1;
        if self.store.increment(key) {
            return;
        }
        if self.store.len() < self.k {
            self.store.insert(key, 1);
            return;
        }
        // Full: the new key inherits the evicted minimum, which bounds its
        // overestimate by that count.
        let min_count = self.store.pop_min().map(|(_, count)| count).unwrap_or(0);
        self.store.insert(key, min_count + 1);
    }

    pub fn observe_all(&mut self, keys: impl IntoIterator<Item = u32>) {
        for key in keys {
            self.observe(key);
        }
    }

    /// Tracked `(key, count)` pairs sorted by key.
    pub fn counts(&self) -> Vec<(u32, u64)> {
        let mut entries = self.store.entries();
        entries.sort_unstable();
        entries
    }

    /// Frequency table of every tracked key, descending count.
    pub fn finalize(&self) -> Vec<KeyFrequency> {
        let total = self.total_seen.max(1) as f64;
        let mut table: Vec<KeyFrequency> = self
            .store
            .entries()
            .into_iter()
            .map(|(key, count)| KeyFrequency {
                key,
                count,
                frequency: count as f64 / total,
            })
            .collect();
        table.sort_by(|a, b| b.count.cmp(&a.count).then(a.key.cmp(&b.key)));
        table
    }

    /// Keys whose frequency is strictly above `threshold`, descending count.
    pub fn heavy_hitters(&self, threshold: f64) -> Vec<(u32, f64)> {
        self.finalize()
            .into_iter()
            .filter(|entry| entry.frequency > threshold)
            .map(|entry| (entry.key, entry.frequency))
            .collect()
    }

    pub fn heavy_hitter_set(&self, threshold: f64) -> HeavyHitterSet {
        HeavyHitterSet::from_pairs(self.heavy_hitters(threshold))
    }
}

impl fmt::Debug for SpaceSaving {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpaceSaving")
            .field("k", &self.k)
            .field("strategy", &self.store.strategy())
            .field("total_seen", &self.total_seen)
            .field("tracked", &self.store.len())
            .finish()
    }
}

/// Join keys of every `stride`-th row, starting with the first.
pub fn sample_keys(rows: &[Row], stride: usize) -> Result<Vec<u32>> {
    if stride == 0 {
        return Err(JoinError::Config("sample stride must be > 0".to_string()));
    }
    Ok(rows.iter().step_by(stride).map(|row| row.join_val).collect())
}
