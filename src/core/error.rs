use thiserror::Error;

#[derive(Error, Debug)]
pub enum JoinError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tuple store capacity exceeded: capacity is {capacity} rows")]
    CapacityExceeded { capacity: usize },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Planning error: {0}")]
    Planning(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, JoinError>;

impl<T> From<std::sync::PoisonError<T>> for JoinError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}

impl From<std::io::Error> for JoinError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<tokio::task::JoinError> for JoinError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Execution(format!("node task join: {}", err))
    }
}
