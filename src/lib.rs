// ============================================================================
// skewjoin Library
// ============================================================================

pub mod cluster;
pub mod config;
pub mod core;
pub mod estimator;
pub mod executor;
pub mod io;
pub mod planner;
pub mod storage;
pub mod transport;

// Re-export main types for convenience
pub use crate::core::{JoinError, NodeId, Relation, Result, Row};

pub use config::{HeavyHitterScope, JoinConfig, NodeConfig, SkewPolicy};
pub use estimator::{EstimatorStrategy, HeavyHitterSet, KeyFrequency, SpaceSaving};
pub use storage::{SharedTupleStore, TupleStore};
pub use planner::{Destination, RedistributionPlan, RedistributionPlanner};
pub use executor::{JoinOutput, LocalJoinExecutor, hash_join};

// Re-export cluster API
pub use cluster::{
    ClusterReport, JoinNode, NodeInput, NodeReport, SimulationReport, TransportKind,
    run_cluster, simulate,
};
pub use transport::{InMemoryTransport, InMemoryTransportHub, TcpTransport, Transport};
