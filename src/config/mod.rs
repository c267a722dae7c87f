pub mod join;
pub mod nodes;

pub use join::{HeavyHitterScope, JoinConfig, SkewPolicy};
pub use nodes::NodeConfig;
