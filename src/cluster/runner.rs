use super::node::{JoinNode, NodeInput, NodeReport};
use crate::config::{JoinConfig, NodeConfig};
use crate::core::{JoinError, Result, Row};
use crate::estimator::HeavyHitterSet;
use crate::transport::{InMemoryTransportHub, Rendezvous, TcpTransport, Transport};
use futures::future::try_join_all;
use log::info;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How the nodes of a cluster run reach each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportKind {
    /// Channels inside this process.
    Memory,
    /// TCP on the given addresses.
    Tcp(NodeConfig),
    /// TCP on ephemeral localhost ports.
    LocalTcp,
}

/// Every node's report of one run.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterReport {
    pub node_count: usize,
    pub nodes: Vec<NodeReport>,
    pub elapsed: Duration,
}

impl ClusterReport {
    pub fn total_rows(&self) -> usize {
        self.nodes.iter().map(|node| node.join.row_count()).sum()
    }

    /// Output rows of all nodes, in node order.
    pub fn rows(&self) -> Vec<Row> {
        self.nodes
            .iter()
            .flat_map(|node| node.rows().iter().copied())
            .collect()
    }

    /// Largest per-node join output, the straggler of the run.
    pub fn max_node_rows(&self) -> usize {
        self.nodes
            .iter()
            .map(|node| node.join.row_count())
            .max()
            .unwrap_or(0)
    }
}

/// Largest R and S shard among `inputs`.
pub fn max_shard_sizes(inputs: &[NodeInput]) -> (usize, usize) {
    inputs.iter().fold((0, 0), |(r, s), input| {
        (r.max(input.r.len()), s.max(input.s.len()))
    })
}

/// Reads one R and one S shard per node.
///
/// Both directories are resolved completely before any file is read, so a
/// missing shard fails fast with [`JoinError::Config`].
pub fn load_inputs(
    r_dir: impl AsRef<Path>,
    s_dir: impl AsRef<Path>,
    node_count: usize,
) -> Result<Vec<NodeInput>> {
    let r_paths = crate::io::shard_paths(r_dir, node_count)?;
    let s_paths = crate::io::shard_paths(s_dir, node_count)?;
    r_paths
        .iter()
        .zip(&s_paths)
        .map(|(r_path, s_path)| NodeInput::from_files(r_path, s_path))
        .collect()
}

async fn bind_transports(
    kind: &TransportKind,
    node_count: usize,
) -> Result<Vec<Arc<dyn Transport>>> {
    let mut transports: Vec<Arc<dyn Transport>> = Vec::with_capacity(node_count);
    match kind {
        TransportKind::Memory => {
            let hub = InMemoryTransportHub::new();
            for node_id in 0..node_count {
                transports.push(Arc::new(hub.bind(node_id).await?));
            }
        }
        TransportKind::Tcp(nodes) => {
            if nodes.node_count() != node_count {
                return Err(JoinError::Config(format!(
                    "node config lists {} addresses for {} nodes",
                    nodes.node_count(),
                    node_count
                )));
            }
            for node_id in 0..node_count {
                transports.push(Arc::new(TcpTransport::bind(node_id, nodes.clone()).await?));
            }
        }
        TransportKind::LocalTcp => {
            for transport in TcpTransport::bind_local_cluster(node_count).await? {
                transports.push(Arc::new(transport));
            }
        }
    }
    Ok(transports)
}

/// Runs a whole cluster in this process, one task per node.
///
/// Every transport endpoint is bound before any node starts. The first node
/// failure is returned; the other nodes run into their own timeouts.
pub async fn run_cluster(
    config: JoinConfig,
    inputs: Vec<NodeInput>,
    kind: TransportKind,
) -> Result<ClusterReport> {
    config.validate()?;
    let transports = bind_transports(&kind, config.node_count).await?;
    run_nodes(config, transports, inputs).await
}

/// Runs one node per `(transport, input)` pair. Transport `i` must belong to
/// node `i`.
pub async fn run_nodes(
    config: JoinConfig,
    transports: Vec<Arc<dyn Transport>>,
    inputs: Vec<NodeInput>,
) -> Result<ClusterReport> {
    config.validate()?;
    let node_count = config.node_count;
    if inputs.len() != node_count || transports.len() != node_count {
        return Err(JoinError::Config(format!(
            "{} nodes need as many inputs and transports, got {} and {}",
            node_count,
            inputs.len(),
            transports.len()
        )));
    }
    for (expected, transport) in transports.iter().enumerate() {
        if transport.node_id() != expected {
            return Err(JoinError::Config(format!(
                "transport {} belongs to node {}",
                expected,
                transport.node_id()
            )));
        }
    }

    let started = Instant::now();
    let config = Arc::new(config);
    let rendezvous = Arc::new(Rendezvous::<HeavyHitterSet>::new(node_count)?);
    let nodes = transports
        .into_iter()
        .map(|transport| JoinNode::new(config.clone(), transport, rendezvous.clone()))
        .collect::<Result<Vec<_>>>()?;

    info!("starting {} nodes", node_count);
    let handles: Vec<_> = nodes
        .into_iter()
        .zip(inputs)
        .map(|(node, input)| tokio::spawn(node.run(input)))
        .collect();
    let reports = try_join_all(handles.into_iter().map(|handle| async move {
        match handle.await {
            Ok(result) => result,
            Err(err) => Err(JoinError::from(err)),
        }
    }))
    .await?;

    let report = ClusterReport {
        node_count,
        nodes: reports,
        elapsed: started.elapsed(),
    };
    info!(
        "cluster produced {} rows in {:?}, largest node output {}",
        report.total_rows(),
        report.elapsed,
        report.max_node_rows()
    );
    Ok(report)
}
