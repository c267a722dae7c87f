pub mod error;
pub mod types;

pub use error::{JoinError, Result};
pub use types::{NodeId, Relation, Row};
