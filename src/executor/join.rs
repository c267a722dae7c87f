use crate::core::Row;
use crate::storage::TupleStore;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Inner equi-join on `join_val`: build a multi-valued index over `r`, probe
/// with every row of `s`.
///
/// Every `(r, s)` pair with equal keys produces one output row, so a key with
/// `a` R rows and `b` S rows yields `a * b` rows. Input order is irrelevant to
/// the result set; output follows probe order.
pub fn hash_join(r: &[Row], s: &[Row]) -> Vec<Row> {
    let mut index: HashMap<u32, Vec<&Row>> = HashMap::with_capacity(r.len());
    for row in r {
        index.entry(row.join_val).or_default().push(row);
    }

    let mut joined = Vec::new();
    for probe in s {
        if let Some(matches) = index.get(&probe.join_val) {
            joined.extend(matches.iter().map(|build| Row::joined(build, probe)));
        }
    }
    joined
}

/// Rows produced by one node's local join, with timing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JoinOutput {
    pub build_rows: usize,
    pub probe_rows: usize,
    #[serde(skip)]
    pub rows: Vec<Row>,
    pub elapsed: Duration,
}

impl JoinOutput {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Runs the final join over a node's assembled partition.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalJoinExecutor;

impl LocalJoinExecutor {
    pub fn execute(&self, r: &TupleStore, s: &TupleStore) -> JoinOutput {
        let started = Instant::now();
        let rows = hash_join(r.rows(), s.rows());
        JoinOutput {
            build_rows: r.len(),
            probe_rows: s.len(),
            rows,
            elapsed: started.elapsed(),
        }
    }
}
