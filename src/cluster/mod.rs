//! Node runs and the in-process cluster launcher.

pub mod node;
pub mod runner;
pub mod simulation;

pub use node::{JoinNode, NodeInput, NodeReport, NodeTimings};
pub use runner::{
    ClusterReport, TransportKind, load_inputs, max_shard_sizes, run_cluster, run_nodes,
};
pub use simulation::{SimulatedPartition, SimulationReport, simulate};
