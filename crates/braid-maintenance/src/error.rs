use std::path::PathBuf;

use braid_dag::DagError;
use braid_ledger::LogError;
use braid_merge::MergeError;
use braid_types::PartitionKey;

/// Errors produced by the merge coordinator.
#[derive(Debug, thiserror::Error)]
pub enum MaintenanceError {
    #[error("invalid maintenance config: {0}")]
    Config(String),

    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("partition not attached: {0}")]
    UnknownPartition(PartitionKey),

    #[error("partition already attached: {0}")]
    AlreadyAttached(PartitionKey),

    #[error("coordinator is shut down")]
    Shutdown,

    #[error("maintenance loop failed: {0}")]
    Join(String),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Graph(#[from] DagError),

    #[error(transparent)]
    Payload(#[from] MergeError),
}

/// Convenience alias used throughout the maintenance crate.
pub type Result<T> = std::result::Result<T, MaintenanceError>;
