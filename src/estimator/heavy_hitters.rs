use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Frozen set of heavy join keys with their estimated frequencies.
///
/// Built once per node after sampling and shared read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeavyHitterSet {
    frequencies: HashMap<u32, f64>,
}

impl HeavyHitterSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (u32, f64)>) -> Self {
        Self {
            frequencies: pairs.into_iter().collect(),
        }
    }

    pub fn contains(&self, key: u32) -> bool {
        self.frequencies.contains_key(&key)
    }

    pub fn frequency(&self, key: u32) -> Option<f64> {
        self.frequencies.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Keys with frequencies, highest frequency first (ties by key).
    pub fn ranked(&self) -> Vec<(u32, f64)> {
        let mut ranked: Vec<(u32, f64)> = self.frequencies.iter().map(|(k, f)| (*k, *f)).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked
    }

    /// Merges several node-local sets. A key heavy anywhere is heavy in the
    /// result, keeping the largest frequency seen for it.
    pub fn union<'a>(sets: impl IntoIterator<Item = &'a HeavyHitterSet>) -> Self {
        let mut frequencies: HashMap<u32, f64> = HashMap::new();
        for set in sets {
            for (key, frequency) in &set.frequencies {
                frequencies
                    .entry(*key)
                    .and_modify(|current| *current = current.max(*frequency))
                    .or_insert(*frequency);
            }
        }
        Self { frequencies }
    }
}
