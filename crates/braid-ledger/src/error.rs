use braid_dag::DagError;
use braid_merge::MergeError;
use braid_types::PartitionKey;

/// Errors produced by log operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("partition not found: {0}")]
    UnknownPartition(PartitionKey),

    #[error("record rejected by trust validation: {0}")]
    Untrusted(String),

    #[error("log unavailable: {0}")]
    Unavailable(String),

    #[error("log state lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Graph(#[from] DagError),

    #[error("undecodable payload: {0}")]
    Payload(#[from] MergeError),
}
