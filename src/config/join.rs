use crate::core::{JoinError, Result};
use crate::estimator::EstimatorStrategy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How heavy-hitter keys are routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SkewPolicy {
    /// Broadcast heavy R rows, keep heavy S rows at their origin.
    #[default]
    SkewAware,
    /// Plain hash partitioning, the heavy-hitter set is ignored.
    HashOnly,
}

/// Which heavy-hitter set a node routes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HeavyHitterScope {
    /// Every node routes with the union of all nodes' estimates, exchanged at
    /// the rendezvous.
    #[default]
    Shared,
    /// Every node routes with its own estimate only. Nodes that disagree on a
    /// key lose the matches between them.
    NodeLocal,
}

/// Run configuration shared by every node.
///
/// Created once at startup and passed by value (or `Arc`) to each component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    /// Number of compute nodes
    pub node_count: usize,

    /// Upper bound of R rows in one node's shard
    pub r_rows_per_node: usize,

    /// Upper bound of S rows in one node's shard
    pub s_rows_per_node: usize,

    /// Capacity k of the Space-Saving histogram
    pub heavy_hitter_capacity: usize,

    /// Minimum frequency (exclusive) for a key to count as heavy
    pub heavy_hitter_threshold: f64,

    /// Every Nth S row is fed to the estimator
    pub sample_stride: usize,

    /// Backing store of the estimator
    pub estimator: EstimatorStrategy,

    pub scope: HeavyHitterScope,

    pub policy: SkewPolicy,

    /// Rows per wire message
    pub batch_size: usize,

    pub barrier_timeout_ms: u64,

    pub drain_timeout_ms: u64,

    /// Sleep between empty receive polls
    pub poll_interval_ms: u64,
}

impl JoinConfig {
    /// Create a configuration for `node_count` nodes with default tuning.
    pub fn new(node_count: usize, r_rows_per_node: usize, s_rows_per_node: usize) -> Self {
        Self {
            node_count,
            r_rows_per_node,
            s_rows_per_node,
            heavy_hitter_capacity: 128,
            heavy_hitter_threshold: 0.01,
            sample_stride: 100,
            estimator: EstimatorStrategy::LinearScan,
            scope: HeavyHitterScope::Shared,
            policy: SkewPolicy::SkewAware,
            batch_size: 1024,
            barrier_timeout_ms: 30_000,
            drain_timeout_ms: 60_000,
            poll_interval_ms: 10,
        }
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|err| {
            JoinError::Config(format!("invalid config '{}': {}", path.display(), err))
        })
    }

    /// Sets the per-node shard bounds, e.g. from the largest shards on disk.
    pub fn row_bounds(mut self, r_rows_per_node: usize, s_rows_per_node: usize) -> Self {
        self.r_rows_per_node = r_rows_per_node;
        self.s_rows_per_node = s_rows_per_node;
        self
    }

    pub fn heavy_hitter_capacity(mut self, k: usize) -> Self {
        self.heavy_hitter_capacity = k;
        self
    }

    pub fn heavy_hitter_threshold(mut self, threshold: f64) -> Self {
        self.heavy_hitter_threshold = threshold;
        self
    }

    pub fn sample_stride(mut self, stride: usize) -> Self {
        self.sample_stride = stride;
        self
    }

    pub fn estimator(mut self, strategy: EstimatorStrategy) -> Self {
        self.estimator = strategy;
        self
    }

    pub fn scope(mut self, scope: HeavyHitterScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn policy(mut self, policy: SkewPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn batch_size(mut self, rows: usize) -> Self {
        self.batch_size = rows;
        self
    }

    pub fn barrier_timeout(mut self, timeout: Duration) -> Self {
        self.barrier_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn barrier_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.barrier_timeout_ms)
    }

    pub fn drain_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn poll_interval_duration(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Capacity of a node's receive store for `relation`.
    ///
    /// A node can at most receive every row of every shard, which happens when
    /// all keys hash to it or every row is a broadcast heavy hitter.
    pub fn receive_capacity(&self, relation: crate::core::Relation) -> usize {
        let per_node = match relation {
            crate::core::Relation::R => self.r_rows_per_node,
            crate::core::Relation::S => self.s_rows_per_node,
        };
        per_node.saturating_mul(self.node_count)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.node_count == 0 {
            return Err(JoinError::Config("node_count must be > 0".to_string()));
        }

        if self.heavy_hitter_capacity == 0 {
            return Err(JoinError::Config(
                "heavy_hitter_capacity must be > 0".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.heavy_hitter_threshold) {
            return Err(JoinError::Config(format!(
                "heavy_hitter_threshold must be in [0, 1), got {}",
                self.heavy_hitter_threshold
            )));
        }

        if self.sample_stride == 0 {
            return Err(JoinError::Config("sample_stride must be > 0".to_string()));
        }

        if self.batch_size == 0 {
            return Err(JoinError::Config("batch_size must be > 0".to_string()));
        }

        Ok(())
    }
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self::new(1, 0, 0)
    }
}
