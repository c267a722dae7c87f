use super::EstimatorStrategy;
use super::store::CounterStore;
use std::collections::HashMap;

/// Hash table only. Eviction scans every counter.
#[derive(Debug, Default, Clone)]
pub struct LinearScanStore {
    counters: HashMap<u32, u64>,
}

impl LinearScanStore {
    pub fn with_capacity(k: usize) -> Self {
        Self {
            counters: HashMap::with_capacity(k),
        }
    }
}

impl CounterStore for LinearScanStore {
    fn strategy(&self) -> EstimatorStrategy {
        EstimatorStrategy::LinearScan
    }

    fn len(&self) -> usize {
        self.counters.len()
    }

    fn increment(&mut self, key: u32) -> bool {
        match self.counters.get_mut(&key) {
            Some(count) => {
                *count += 1;
                true
            }
            None => false,
        }
    }

    fn insert(&mut self, key: u32, count: u64) {
        self.counters.insert(key, count);
    }

    fn pop_min(&mut self) -> Option<(u32, u64)> {
        let (&key, &count) = self
            .counters
            .iter()
            .min_by_key(|(key, count)| (**count, **key))?;
        self.counters.remove(&key);
        Some((key, count))
    }

    fn entries(&self) -> Vec<(u32, u64)> {
        self.counters.iter().map(|(k, c)| (*k, *c)).collect()
    }
}
