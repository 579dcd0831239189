use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Partition mismatch: {0}")]
    PartitionMismatch(String),

    #[error("Embedding client failure: {0}")]
    EmbeddingClientFailure(String),

    #[error("Incomplete merge: expected {expected} worker outputs, missing ordinals {missing:?}")]
    IncompleteMerge { expected: usize, missing: Vec<usize> },

    #[error("Index alignment violated: {0}")]
    IndexAlignment(String),

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
