pub mod join;

pub use join::{JoinOutput, LocalJoinExecutor, hash_join};
