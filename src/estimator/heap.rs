use super::EstimatorStrategy;
use super::store::CounterStore;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Hash table plus a min-heap of `(count, key)`.
///
/// `BinaryHeap` cannot update an entry in place, so an increment pushes a new
/// entry and leaves the old one behind. An entry is live only while it matches
/// the counter in the map; `pop_min` discards the rest. The heap is rebuilt
/// from the map once stale entries outnumber live ones `COMPACT_FACTOR` times.
#[derive(Debug, Default, Clone)]
pub struct MinHeapStore {
    counters: HashMap<u32, u64>,
    heap: BinaryHeap<Reverse<(u64, u32)>>,
}

const COMPACT_FACTOR: usize = 4;

impl MinHeapStore {
    pub fn with_capacity(k: usize) -> Self {
        Self {
            counters: HashMap::with_capacity(k),
            heap: BinaryHeap::with_capacity(k),
        }
    }

    fn is_live(&self, count: u64, key: u32) -> bool {
        self.counters.get(&key) == Some(&count)
    }

    fn compact_if_needed(&mut self) {
        if self.heap.len() <= (self.counters.len() + 1) * COMPACT_FACTOR {
            return;
        }
        self.heap = self
            .counters
            .iter()
            .map(|(key, count)| Reverse((*count, *key)))
            .collect();
    }

    #[cfg(test)]
    fn heap_len(&self) -> usize {
        self.heap.len()
    }
}

impl CounterStore for MinHeapStore {
    fn strategy(&self) -> EstimatorStrategy {
        EstimatorStrategy::MinHeap
    }

    fn len(&self) -> usize {
        self.counters.len()
    }

    fn increment(&mut self, key: u32) -> bool {
        let Some(count) = self.counters.get_mut(&key) else {
            return false;
        };
        *count += 1;
        let count = *count;
        self.heap.push(Reverse((count, key)));
        self.compact_if_needed();
        true
    }

    fn insert(&mut self, key: u32, count: u64) {
        self.counters.insert(key, count);
        self.heap.push(Reverse((count, key)));
    }

    fn pop_min(&mut self) -> Option<(u32, u64)> {
        while let Some(Reverse((count, key))) = self.heap.pop() {
            if self.is_live(count, key) {
                self.counters.remove(&key);
                return Some((key, count));
            }
        }
        None
    }

    fn entries(&self) -> Vec<(u32, u64)> {
        self.counters.iter().map(|(k, c)| (*k, *c)).collect()
    }
}
