use crate::config::{HeavyHitterScope, JoinConfig};
use crate::core::{JoinError, NodeId, Relation, Result, Row};
use crate::estimator::{HeavyHitterSet, SpaceSaving, sample_keys};
use crate::executor::{JoinOutput, LocalJoinExecutor};
use crate::planner::{PlanSummary, RedistributionPlanner};
use crate::transport::{
    ReceiveStats, ReceiveStores, Rendezvous, Transport, send_end_of_stream, send_rows,
    spawn_receiver,
};
use log::{debug, info};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, info_span};

/// The local shards of one node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeInput {
    pub r: Vec<Row>,
    pub s: Vec<Row>,
}

impl NodeInput {
    pub fn new(r: Vec<Row>, s: Vec<Row>) -> Self {
        Self { r, s }
    }

    pub fn from_files(r_path: impl AsRef<Path>, s_path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            r: crate::io::read_tuples(r_path, Relation::R)?,
            s: crate::io::read_tuples(s_path, Relation::S)?,
        })
    }

    pub fn rows(&self, relation: Relation) -> &[Row] {
        match relation {
            Relation::R => &self.r,
            Relation::S => &self.s,
        }
    }
}

/// Wall time of each phase of a node run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct NodeTimings {
    pub estimate: Duration,
    pub rendezvous: Duration,
    pub redistribute: Duration,
    pub drain: Duration,
    pub join: Duration,
}

/// Outcome of one node's run.
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub node_id: NodeId,
    pub input_r: usize,
    pub input_s: usize,
    /// S keys fed to the estimator
    pub sampled: usize,
    /// Heavy hitters this node estimated on its own, most frequent first
    pub local_heavy_hitters: Vec<(u32, f64)>,
    /// Size of the set the node actually routed with
    pub routing_heavy_hitters: usize,
    pub r_plan: PlanSummary,
    pub s_plan: PlanSummary,
    /// Row messages sent to peers, end-of-stream markers excluded
    pub row_messages: usize,
    pub received: ReceiveStats,
    pub join: JoinOutput,
    pub timings: NodeTimings,
}

impl NodeReport {
    pub fn rows(&self) -> &[Row] {
        &self.join.rows
    }
}

/// One compute node of a join.
///
/// A node owns its transport endpoint and shares the rendezvous with its
/// peers. [`run`](Self::run) goes through the phases in order: sample S and
/// estimate heavy hitters, meet every peer at the rendezvous, redistribute
/// both relations, drain inbound rows until all peers finished, join locally.
pub struct JoinNode {
    node_id: NodeId,
    config: Arc<JoinConfig>,
    transport: Arc<dyn Transport>,
    rendezvous: Arc<Rendezvous<HeavyHitterSet>>,
}

impl JoinNode {
    pub fn new(
        config: Arc<JoinConfig>,
        transport: Arc<dyn Transport>,
        rendezvous: Arc<Rendezvous<HeavyHitterSet>>,
    ) -> Result<Self> {
        config.validate()?;
        let node_id = transport.node_id();
        if node_id >= config.node_count {
            return Err(JoinError::Config(format!(
                "node id {} out of range for {} nodes",
                node_id, config.node_count
            )));
        }
        if rendezvous.parties() != config.node_count {
            return Err(JoinError::Config(format!(
                "rendezvous has {} parties but the cluster has {} nodes",
                rendezvous.parties(),
                config.node_count
            )));
        }
        Ok(Self {
            node_id,
            config,
            transport,
            rendezvous,
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Heavy hitters of the sampled S shard, and the sample size.
    pub fn estimate(&self, s: &[Row]) -> Result<(HeavyHitterSet, usize)> {
        let sample = sample_keys(s, self.config.sample_stride)?;
        let mut estimator =
            SpaceSaving::new(self.config.heavy_hitter_capacity, self.config.estimator)?;
        estimator.observe_all(sample.iter().copied());
        debug!("node {} estimator state: {:?}", self.node_id, estimator);
        Ok((
            estimator.heavy_hitter_set(self.config.heavy_hitter_threshold),
            sample.len(),
        ))
    }

    pub async fn run(self, input: NodeInput) -> Result<NodeReport> {
        let span = info_span!("skewjoin.node", node_id = self.node_id);
        self.execute(input).instrument(span).await
    }

    fn check_input(&self, input: &NodeInput) -> Result<()> {
        for (relation, bound) in [
            (Relation::R, self.config.r_rows_per_node),
            (Relation::S, self.config.s_rows_per_node),
        ] {
            let rows = input.rows(relation).len();
            if rows > bound {
                return Err(JoinError::Config(format!(
                    "node {} holds {} {} rows, the per-node bound is {}",
                    self.node_id, rows, relation, bound
                )));
            }
        }
        Ok(())
    }

    async fn execute(self, input: NodeInput) -> Result<NodeReport> {
        self.check_input(&input)?;
        let config = self.config.clone();
        let node_count = config.node_count;
        let mut timings = NodeTimings::default();

        // Listening starts before the rendezvous, so no peer can send into
        // a node that is not draining yet.
        let stores = ReceiveStores::with_capacity(
            config.receive_capacity(Relation::R),
            config.receive_capacity(Relation::S),
        );
        let receiver = spawn_receiver(
            self.transport.clone(),
            stores.clone(),
            node_count - 1,
            config.poll_interval_duration(),
        );

        let started = Instant::now();
        let (local_set, sampled) = self.estimate(&input.s)?;
        timings.estimate = started.elapsed();
        info!(
            "node {}: {} of {} S rows sampled, {} local heavy hitters",
            self.node_id,
            sampled,
            input.s.len(),
            local_set.len()
        );

        let started = Instant::now();
        let contributions = self
            .rendezvous
            .arrive_within(
                self.node_id,
                local_set.clone(),
                config.barrier_timeout_duration(),
            )
            .await?;
        let routing = match config.scope {
            HeavyHitterScope::Shared => HeavyHitterSet::union(contributions.iter()),
            HeavyHitterScope::NodeLocal => local_set.clone(),
        };
        timings.rendezvous = started.elapsed();
        debug!(
            "node {} routes with {} heavy hitters ({:?} scope)",
            self.node_id,
            routing.len(),
            config.scope
        );

        let started = Instant::now();
        let routing_heavy_hitters = routing.len();
        let planner =
            RedistributionPlanner::new(self.node_id, node_count, Arc::new(routing), config.policy)?;
        let r_plan = planner.plan(Relation::R, &input.r)?;
        let s_plan = planner.plan(Relation::S, &input.s)?;

        let mut row_messages = 0;
        for plan in [&r_plan, &s_plan] {
            stores
                .for_relation(plan.relation())
                .extend_from_slice(plan.local())?;
            for (target, rows) in plan.outbound() {
                row_messages += send_rows(
                    self.transport.as_ref(),
                    target,
                    plan.relation(),
                    rows,
                    config.batch_size,
                )
                .await?;
            }
        }
        for peer in (0..node_count).filter(|peer| *peer != self.node_id) {
            send_end_of_stream(self.transport.as_ref(), peer).await?;
        }
        timings.redistribute = started.elapsed();
        info!(
            "node {} sent {} R and {} S rows in {} messages",
            self.node_id,
            r_plan.summary().sent,
            s_plan.summary().sent,
            row_messages
        );

        let started = Instant::now();
        let received = receiver.wait(config.drain_timeout_duration()).await?;
        timings.drain = started.elapsed();

        let r_partition = stores.r.snapshot()?;
        let s_partition = stores.s.snapshot()?;
        let join = LocalJoinExecutor.execute(&r_partition, &s_partition);
        timings.join = join.elapsed;
        info!(
            "node {} joined {} R x {} S rows into {} rows",
            self.node_id,
            join.build_rows,
            join.probe_rows,
            join.row_count()
        );

        Ok(NodeReport {
            node_id: self.node_id,
            input_r: input.r.len(),
            input_s: input.s.len(),
            sampled,
            local_heavy_hitters: local_set.ranked(),
            routing_heavy_hitters,
            r_plan: r_plan.summary(),
            s_plan: s_plan.summary(),
            row_messages,
            received,
            join,
            timings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InMemoryTransportHub;

    #[tokio::test]
    async fn single_node_joins_its_own_shards() {
        let config = Arc::new(JoinConfig::new(1, 2, 3).sample_stride(1));
        let hub = InMemoryTransportHub::new();
        let transport: Arc<dyn Transport> = Arc::new(hub.bind(0).await.unwrap());
        let node = JoinNode::new(config, transport, Arc::new(Rendezvous::new(1).unwrap())).unwrap();

        let input = NodeInput::new(
            vec![Row::new(1, 10, 0), Row::new(2, 20, 0)],
            vec![Row::new(1, 0, 100), Row::new(2, 0, 200), Row::new(4, 0, 400)],
        );
        let report = node.run(input).await.unwrap();

        let mut rows = report.rows().to_vec();
        rows.sort();
        assert_eq!(rows, vec![Row::new(1, 10, 100), Row::new(2, 20, 200)]);
        assert_eq!(report.row_messages, 0);
        assert_eq!(report.received.finished_peers, 0);
    }

    #[tokio::test]
    async fn oversized_shard_is_rejected_before_any_exchange() {
        let config = Arc::new(JoinConfig::new(1, 1, 1));
        let hub = InMemoryTransportHub::new();
        let transport: Arc<dyn Transport> = Arc::new(hub.bind(0).await.unwrap());
        let node = JoinNode::new(config, transport, Arc::new(Rendezvous::new(1).unwrap())).unwrap();

        let input = NodeInput::new(vec![Row::new(1, 1, 0), Row::new(2, 2, 0)], Vec::new());
        assert!(matches!(node.run(input).await, Err(JoinError::Config(_))));
    }

    #[tokio::test]
    async fn mismatched_rendezvous_is_a_config_error() {
        let config = Arc::new(JoinConfig::new(2, 1, 1));
        let hub = InMemoryTransportHub::new();
        let transport: Arc<dyn Transport> = Arc::new(hub.bind(0).await.unwrap());
        let result = JoinNode::new(config, transport, Arc::new(Rendezvous::new(3).unwrap()));
        assert!(matches!(result, Err(JoinError::Config(_))));
    }

    #[tokio::test]
    async fn estimate_samples_every_nth_row() {
        let config = Arc::new(
            JoinConfig::new(1, 0, 8)
                .sample_stride(2)
                .heavy_hitter_capacity(2)
                .heavy_hitter_threshold(0.5),
        );
        let hub = InMemoryTransportHub::new();
        let transport: Arc<dyn Transport> = Arc::new(hub.bind(0).await.unwrap());
        let node = JoinNode::new(config, transport, Arc::new(Rendezvous::new(1).unwrap())).unwrap();

        // sampled keys: 5 5 5 1
        let s: Vec<Row> = [5, 9, 5, 9, 5, 9, 1, 9]
            .iter()
            .enumerate()
            .map(|(id, key)| Row::input(Relation::S, *key, id as u32))
            .collect();
        let (set, sampled) = node.estimate(&s).unwrap();
        assert_eq!(sampled, 4);
        assert!(set.contains(5));
        assert!(!set.contains(9));
    }
}
