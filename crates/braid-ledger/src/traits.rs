use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use braid_dag::PartitionChain;
use braid_types::{PartitionKey, VersionId};

use crate::error::LogError;
use crate::record::VersionRecord;

/// Acknowledgement of a durable append.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub partition: PartitionKey,
    /// Offset assigned by the log.
    pub offset: u64,
    pub version: VersionId,
}

/// Write boundary: publish a version record to a partition.
///
/// Delivery is at-least-once; appending a version that is already present
/// leaves the indexed graph unchanged.
#[async_trait]
pub trait VersionSink: Send + Sync {
    async fn append_version(
        &self,
        partition: &PartitionKey,
        record: VersionRecord,
    ) -> Result<Ack, LogError>;
}

/// Read boundary: partitions, their indexed chains and raw records.
pub trait VersionReader: Send + Sync {
    fn partitions(&self) -> Result<Vec<PartitionKey>, LogError>;

    fn chain(&self, partition: &PartitionKey) -> Result<Option<Arc<PartitionChain>>, LogError>;

    fn read_all(&self, partition: &PartitionKey) -> Result<Vec<VersionRecord>, LogError>;

    fn record_count(&self, partition: &PartitionKey) -> Result<u64, LogError> {
        Ok(self.read_all(partition)?.len() as u64)
    }
}

#[async_trait]
impl<T: VersionSink + ?Sized> VersionSink for Arc<T> {
    async fn append_version(
        &self,
        partition: &PartitionKey,
        record: VersionRecord,
    ) -> Result<Ack, LogError> {
        (**self).append_version(partition, record).await
    }
}
