use super::EstimatorStrategy;
use super::store::CounterStore;
use std::collections::{BTreeSet, HashMap};

/// Hash table plus an ordered set of `(count, key)`; every count change
/// removes and re-inserts the entry.
#[derive(Debug, Default, Clone)]
pub struct SortedSetStore {
    counters: HashMap<u32, u64>,
    ordered: BTreeSet<(u64, u32)>,
}

impl SortedSetStore {
    pub fn with_capacity(k: usize) -> Self {
        Self {
            counters: HashMap::with_capacity(k),
            ordered: BTreeSet::new(),
        }
    }
}

impl CounterStore for SortedSetStore {
    fn strategy(&self) -> EstimatorStrategy {
        EstimatorStrategy::SortedSet
    }

    fn len(&self) -> usize {
        self.counters.len()
    }

    fn increment(&mut self, key: u32) -> bool {
        let Some(count) = self.counters.get_mut(&key) else {
            return false;
        };
        self.ordered.remove(&(*count, key));
        *count += 1;
        self.ordered.insert((*count, key));
        true
    }

    fn insert(&mut self, key: u32, count: u64) {
        self.counters.insert(key, count);
        self.ordered.insert((count, key));
    }

    fn pop_min(&mut self) -> Option<(u32, u64)> {
        let (count, key) = self.ordered.pop_first()?;
        self.counters.remove(&key);
        Some((key, count))
    }

    fn entries(&self) -> Vec<(u32, u64)> {
        self.ordered.iter().map(|(c, k)| (*k, *c)).collect()
    }
}
