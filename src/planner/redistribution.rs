use crate::config::SkewPolicy;
use crate::core::{JoinError, NodeId, Relation, Result, Row};
use crate::estimator::HeavyHitterSet;
use serde::Serialize;
use std::sync::Arc;

/// Where copies of one row go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Exactly one copy, to the hashed node.
    Node(NodeId),
    /// One copy to every node, the origin included.
    Broadcast,
    /// Stays at the origin node and is never sent.
    Retain,
}

/// Target of a non-heavy key under hash partitioning.
pub fn hash_target(join_val: u32, node_count: usize) -> NodeId {
    (join_val as u64 % node_count as u64) as NodeId
}

/// Per-relation counters reported after planning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    /// Copies kept at the origin node
    pub local: usize,
    /// Copies addressed to other nodes
    pub sent: usize,
    /// Input rows that were broadcast
    pub broadcast_rows: usize,
    /// Input rows that were retained as heavy hitters
    pub retained_rows: usize,
}

/// The outcome of planning one relation at one node.
#[derive(Debug, Clone)]
pub struct RedistributionPlan {
    relation: Relation,
    origin: NodeId,
    outbound: Vec<Vec<Row>>,
    local: Vec<Row>,
    summary: PlanSummary,
}

impl RedistributionPlan {
    pub fn new(relation: Relation, origin: NodeId, node_count: usize) -> Self {
        Self {
            relation,
            origin,
            outbound: vec![Vec::new(); node_count],
            local: Vec::new(),
            summary: PlanSummary::default(),
        }
    }

    pub fn relation(&self) -> Relation {
        self.relation
    }

    pub fn node_count(&self) -> usize {
        self.outbound.len()
    }

    /// Adds one copy of `row` for `target`.
    ///
    /// A copy for the origin is kept locally and not counted as sent.
    pub fn deliver(&mut self, target: NodeId, row: Row) -> Result<()> {
        if target >= self.outbound.len() {
            return Err(JoinError::Planning(format!(
                "{} row with key {} targets node {}, valid range is [0, {})",
                self.relation,
                row.join_val,
                target,
                self.outbound.len()
            )));
        }
        if target == self.origin {
            self.local.push(row);
            self.summary.local += 1;
        } else {
            self.outbound[target].push(row);
            self.summary.sent += 1;
        }
        Ok(())
    }

    fn retain(&mut self, row: Row) {
        self.local.push(row);
        self.summary.local += 1;
        self.summary.retained_rows += 1;
    }

    /// Rows addressed to `node`. Always empty for the origin.
    pub fn outbound_to(&self, node: NodeId) -> &[Row] {
        self.outbound.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Rows that stay at the origin, whether hashed there, broadcast or retained.
    pub fn local(&self) -> &[Row] {
        &self.local
    }

    pub fn summary(&self) -> PlanSummary {
        self.summary
    }

    /// Per-target outbound batches with their node ids, skipping empty ones.
    pub fn outbound(&self) -> impl Iterator<Item = (NodeId, &[Row])> {
        self.outbound
            .iter()
            .enumerate()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(node, rows)| (node, rows.as_slice()))
    }
}

/// Decides the destination of every local row.
#[derive(Debug, Clone)]
pub struct RedistributionPlanner {
    node_id: NodeId,
    node_count: usize,
    heavy_hitters: Arc<HeavyHitterSet>,
    policy: SkewPolicy,
}

impl RedistributionPlanner {
    pub fn new(
        node_id: NodeId,
        node_count: usize,
        heavy_hitters: Arc<HeavyHitterSet>,
        policy: SkewPolicy,
    ) -> Result<Self> {
        if node_count == 0 {
            return Err(JoinError::Config("node_count must be > 0".to_string()));
        }
        if node_id >= node_count {
            return Err(JoinError::Config(format!(
                "node id {} out of range for {} nodes",
                node_id, node_count
            )));
        }
        Ok(Self {
            node_id,
            node_count,
            heavy_hitters,
            policy,
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn heavy_hitters(&self) -> &HeavyHitterSet {
        &self.heavy_hitters
    }

    pub fn is_heavy(&self, join_val: u32) -> bool {
        self.policy == SkewPolicy::SkewAware && self.heavy_hitters.contains(join_val)
    }

    pub fn destination(&self, relation: Relation, join_val: u32) -> Destination {
        if !self.is_heavy(join_val) {
            return Destination::Node(hash_target(join_val, self.node_count));
        }
        match relation {
            Relation::R => Destination::Broadcast,
            Relation::S => Destination::Retain,
        }
    }

    pub fn plan(&self, relation: Relation, rows: &[Row]) -> Result<RedistributionPlan> {
        let mut plan = RedistributionPlan::new(relation, self.node_id, self.node_count);
        for row in rows {
            match self.destination(relation, row.join_val) {
                Destination::Node(target) => plan.deliver(target, *row)?,
                Destination::Broadcast => {
                    for target in 0..self.node_count {
                        plan.deliver(target, *row)?;
                    }
                    plan.summary.broadcast_rows += 1;
                }
                Destination::Retain => plan.retain(*row),
            }
        }
        Ok(plan)
    }
}
