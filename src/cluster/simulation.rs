//! Single-process rendition of a cluster run without any transport.
//!
//! One estimator sees the samples of every S shard, rows are copied straight
//! into per-node stores, and each node's join is timed on its own. Useful to
//! measure load balance for a given skew without network noise.

use super::node::NodeInput;
use crate::config::JoinConfig;
use crate::core::{JoinError, NodeId, Relation, Result, Row};
use crate::estimator::{SpaceSaving, sample_keys};
use crate::executor::{JoinOutput, LocalJoinExecutor};
use crate::planner::RedistributionPlanner;
use crate::storage::TupleStore;
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize)]
pub struct SimulatedPartition {
    pub node_id: NodeId,
    pub join: JoinOutput,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub node_count: usize,
    pub sampled: usize,
    pub heavy_hitters: Vec<(u32, f64)>,
    pub partitions: Vec<SimulatedPartition>,
    pub elapsed: Duration,
}

impl SimulationReport {
    pub fn total_rows(&self) -> usize {
        self.partitions
            .iter()
            .map(|partition| partition.join.row_count())
            .sum()
    }

    pub fn rows(&self) -> Vec<Row> {
        self.partitions
            .iter()
            .flat_map(|partition| partition.join.rows.iter().copied())
            .collect()
    }

    /// Slowest per-node join, the simulated completion time.
    pub fn slowest_join(&self) -> Duration {
        self.partitions
            .iter()
            .map(|partition| partition.join.elapsed)
            .max()
            .unwrap_or_default()
    }
}

pub fn simulate(config: &JoinConfig, inputs: &[NodeInput]) -> Result<SimulationReport> {
    config.validate()?;
    let node_count = config.node_count;
    if inputs.len() != node_count {
        return Err(JoinError::Config(format!(
            "{} nodes need {} inputs, got {}",
            node_count,
            node_count,
            inputs.len()
        )));
    }
    let started = Instant::now();

    let mut estimator = SpaceSaving::new(config.heavy_hitter_capacity, config.estimator)?;
    let mut sampled = 0;
    for input in inputs {
        let sample = sample_keys(&input.s, config.sample_stride)?;
        sampled += sample.len();
        estimator.observe_all(sample);
    }
    let heavy_hitters = Arc::new(estimator.heavy_hitter_set(config.heavy_hitter_threshold));
    info!(
        "simulation: {} sampled keys, {} heavy hitters",
        sampled,
        heavy_hitters.len()
    );

    let mut r_stores: Vec<TupleStore> = (0..node_count)
        .map(|_| TupleStore::with_capacity(config.receive_capacity(Relation::R)))
        .collect();
    let mut s_stores: Vec<TupleStore> = (0..node_count)
        .map(|_| TupleStore::with_capacity(config.receive_capacity(Relation::S)))
        .collect();

    for (origin, input) in inputs.iter().enumerate() {
        let planner =
            RedistributionPlanner::new(origin, node_count, heavy_hitters.clone(), config.policy)?;
        for (relation, stores) in [(Relation::R, &mut r_stores), (Relation::S, &mut s_stores)] {
            let plan = planner.plan(relation, input.rows(relation))?;
            stores[origin].extend_from_slice(plan.local())?;
            for (target, rows) in plan.outbound() {
                stores[target].extend_from_slice(rows)?;
            }
        }
    }

    let partitions = r_stores
        .iter()
        .zip(&s_stores)
        .enumerate()
        .map(|(node_id, (r, s))| {
            let join = LocalJoinExecutor.execute(r, s);
            debug!(
                "simulated node {}: {} x {} rows -> {} in {:?}",
                node_id,
                r.len(),
                s.len(),
                join.row_count(),
                join.elapsed
            );
            SimulatedPartition { node_id, join }
        })
        .collect();

    Ok(SimulationReport {
        node_count,
        sampled,
        heavy_hitters: heavy_hitters.ranked(),
        partitions,
        elapsed: started.elapsed(),
    })
}
