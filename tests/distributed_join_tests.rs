use skewjoin::cluster::{self, NodeInput, TransportKind};
use skewjoin::transport::{InMemoryTransportHub, Rendezvous, Transport};
use skewjoin::{
    HeavyHitterScope, JoinConfig, JoinError, JoinNode, Relation, Row, SkewPolicy, hash_join,
};
use std::sync::Arc;
use std::time::Duration;

fn shard(relation: Relation, keys: &[u32], first_id: u32) -> Vec<Row> {
    keys.iter()
        .zip(first_id..)
        .map(|(key, id)| Row::input(relation, *key, id))
        .collect()
}

fn sorted(mut rows: Vec<Row>) -> Vec<Row> {
    rows.sort();
    rows
}

/// The join of all shards taken together, computed on one node.
fn reference_join(inputs: &[NodeInput]) -> Vec<Row> {
    let r: Vec<Row> = inputs.iter().flat_map(|input| input.r.clone()).collect();
    let s: Vec<Row> = inputs.iter().flat_map(|input| input.s.clone()).collect();
    sorted(hash_join(&r, &s))
}

fn fitted_config(inputs: &[NodeInput]) -> JoinConfig {
    let (max_r, max_s) = cluster::max_shard_sizes(inputs);
    JoinConfig::new(inputs.len(), max_r, max_s)
        .poll_interval(Duration::from_millis(1))
        .barrier_timeout(Duration::from_secs(10))
        .drain_timeout(Duration::from_secs(10))
}

/// Three nodes, key 3 makes up most of S.
fn skewed_inputs() -> Vec<NodeInput> {
    (0..3u32)
        .map(|node| {
            let r_keys: Vec<u32> = (0..40).map(|i| (i * 7 + node) % 20).collect();
            let s_keys: Vec<u32> = (0..120)
                .map(|i| if i % 5 < 3 { 3 } else { 10 + (i * 11 + node) % 25 })
                .collect();
            NodeInput::new(
                shard(Relation::R, &r_keys, node * 1000 + 1),
                shard(Relation::S, &s_keys, node * 1000 + 1),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_round_trip_over_memory_transport() {
    let inputs = vec![
        NodeInput::new(
            shard(Relation::R, &[1], 10),
            shard(Relation::S, &[1, 2], 100),
        ),
        NodeInput::new(shard(Relation::R, &[2], 20), shard(Relation::S, &[4], 400)),
    ];
    let config = fitted_config(&inputs).sample_stride(1);

    let report = cluster::run_cluster(config, inputs, TransportKind::Memory)
        .await
        .unwrap();

    assert_eq!(
        sorted(report.rows()),
        vec![Row::new(1, 10, 100), Row::new(2, 20, 101)]
    );
    assert_eq!(report.node_count, 2);
    assert_eq!(report.total_rows(), 2);
}

#[tokio::test]
async fn test_skewed_join_matches_reference() {
    let inputs = skewed_inputs();
    let expected = reference_join(&inputs);
    let config = fitted_config(&inputs).sample_stride(2).batch_size(16);

    let report = cluster::run_cluster(config, inputs, TransportKind::Memory)
        .await
        .unwrap();

    assert_eq!(sorted(report.rows()), expected);
    for node in &report.nodes {
        assert_eq!(node.local_heavy_hitters[0].0, 3);
        assert_eq!(node.received.finished_peers, 2);
        // heavy S rows never leave their node
        assert!(node.s_plan.retained_rows >= 72);
    }
}

#[tokio::test]
async fn test_heavy_key_output_is_spread_over_nodes() {
    let inputs = skewed_inputs();
    let heavy_r: usize = inputs
        .iter()
        .map(|input| input.r.iter().filter(|row| row.join_val == 3).count())
        .sum();
    assert!(heavy_r > 0);
    let config = fitted_config(&inputs)
        .sample_stride(1)
        .heavy_hitter_threshold(0.1);

    let report = cluster::run_cluster(config, inputs, TransportKind::Memory)
        .await
        .unwrap();

    // every node keeps its own 72 heavy S rows and sees every broadcast R row
    for node in &report.nodes {
        let heavy_rows = node.rows().iter().filter(|row| row.join_val == 3).count();
        assert_eq!(heavy_rows, 72 * heavy_r);
        assert_eq!(node.r_plan.broadcast_rows, 2);
    }
}

#[tokio::test]
async fn test_hash_only_baseline_agrees() {
    let inputs = skewed_inputs();
    let expected = reference_join(&inputs);
    let config = fitted_config(&inputs).policy(SkewPolicy::HashOnly);

    let report = cluster::run_cluster(config, inputs, TransportKind::Memory)
        .await
        .unwrap();

    assert_eq!(sorted(report.rows()), expected);
    let heavy_nodes = report
        .nodes
        .iter()
        .filter(|node| node.rows().iter().any(|row| row.join_val == 3))
        .count();
    assert_eq!(heavy_nodes, 1);
    for node in &report.nodes {
        assert_eq!(node.r_plan.broadcast_rows, 0);
        assert_eq!(node.s_plan.retained_rows, 0);
    }
}

#[tokio::test]
async fn test_tcp_transport_matches_reference() {
    let inputs = skewed_inputs();
    let expected = reference_join(&inputs);
    let config = fitted_config(&inputs).sample_stride(3).batch_size(32);

    let report = cluster::run_cluster(config, inputs, TransportKind::LocalTcp)
        .await
        .unwrap();

    assert_eq!(sorted(report.rows()), expected);
}

#[tokio::test]
async fn test_simulation_agrees_with_distributed_run() {
    let inputs = skewed_inputs();
    let config = fitted_config(&inputs).sample_stride(4);

    let simulated = cluster::simulate(&config, &inputs).unwrap();
    let distributed = cluster::run_cluster(config, inputs, TransportKind::Memory)
        .await
        .unwrap();

    assert_eq!(sorted(simulated.rows()), sorted(distributed.rows()));
    assert_eq!(simulated.total_rows(), distributed.total_rows());
}

fn disagreeing_inputs() -> Vec<NodeInput> {
    vec![
        NodeInput::new(Vec::new(), shard(Relation::S, &[5, 5, 5, 5], 1)),
        NodeInput::new(
            shard(Relation::R, &[5], 100),
            shard(Relation::S, &[5, 1, 2, 3, 4, 6, 7, 8], 10),
        ),
    ]
}

#[tokio::test]
async fn test_shared_scope_keeps_matches_when_estimates_disagree() {
    let inputs = disagreeing_inputs();
    let expected = reference_join(&inputs);
    assert_eq!(expected.len(), 5);
    let config = fitted_config(&inputs)
        .sample_stride(1)
        .heavy_hitter_threshold(0.5);

    let report = cluster::run_cluster(config, inputs, TransportKind::Memory)
        .await
        .unwrap();

    assert_eq!(sorted(report.rows()), expected);
    assert!(report.nodes.iter().all(|node| node.routing_heavy_hitters == 1));
}

#[tokio::test]
async fn test_node_local_scope_loses_matches_when_estimates_disagree() {
    let inputs = disagreeing_inputs();
    let config = fitted_config(&inputs)
        .sample_stride(1)
        .heavy_hitter_threshold(0.5)
        .scope(HeavyHitterScope::NodeLocal);

    let report = cluster::run_cluster(config, inputs, TransportKind::Memory)
        .await
        .unwrap();

    // node 0 retains its key-5 S rows, node 1 hashes its key-5 R row to itself
    assert_eq!(report.rows(), vec![Row::new(5, 100, 10)]);
    assert_eq!(report.nodes[0].routing_heavy_hitters, 1);
    assert_eq!(report.nodes[1].routing_heavy_hitters, 0);
}

#[tokio::test]
async fn test_missing_peer_times_out_at_rendezvous() {
    let config = Arc::new(
        JoinConfig::new(2, 1, 1)
            .barrier_timeout(Duration::from_millis(50))
            .poll_interval(Duration::from_millis(1)),
    );
    let hub = InMemoryTransportHub::new();
    let transport: Arc<dyn Transport> = Arc::new(hub.bind(0).await.unwrap());
    let _peer = hub.bind(1).await.unwrap();
    let node = JoinNode::new(config, transport, Arc::new(Rendezvous::new(2).unwrap())).unwrap();

    let result = node.run(NodeInput::default()).await;
    assert!(matches!(result, Err(JoinError::Timeout(_))));
}

#[tokio::test]
async fn test_input_count_must_match_node_count() {
    let config = JoinConfig::new(3, 1, 1);
    let result =
        cluster::run_cluster(config, vec![NodeInput::default()], TransportKind::Memory).await;
    assert!(matches!(result, Err(JoinError::Config(_))));
}
