use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("invalid partition key: {0}")]
    InvalidPartitionKey(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
