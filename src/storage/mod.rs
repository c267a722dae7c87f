pub mod tuple_store;

pub use tuple_store::{SharedTupleStore, TupleStore};
