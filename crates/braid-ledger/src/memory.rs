use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, warn};

use braid_dag::{ChainConfig, PartitionChain, VersionNode};
use braid_merge::TypeRegistry;
use braid_types::PartitionKey;

use crate::error::LogError;
use crate::record::VersionRecord;
use crate::traits::{Ack, VersionReader, VersionSink};
use crate::trust::{AcceptAll, TrustValidator};

/// In-memory partitioned log for tests, local tools and embedding.
///
/// Every append is trust-checked, stamped with the next partition offset
/// and indexed into that partition's [`PartitionChain`] before it is
/// acknowledged. With a registry attached, payloads are decoded once on the
/// way in and the graphs hold materialized values.
pub struct InMemoryVersionLog {
    chain_config: ChainConfig,
    validator: Arc<dyn TrustValidator>,
    registry: Option<Arc<TypeRegistry>>,
    inner: RwLock<LogState>,
}

#[derive(Default)]
struct LogState {
    partitions: BTreeMap<PartitionKey, PartitionLog>,
}

struct PartitionLog {
    records: Vec<VersionRecord>,
    chain: Arc<PartitionChain>,
}

impl Default for InMemoryVersionLog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryVersionLog {
    pub fn new() -> Self {
        Self {
            chain_config: ChainConfig::default(),
            validator: Arc::new(AcceptAll),
            registry: None,
            inner: RwLock::new(LogState::default()),
        }
    }

    pub fn with_chain_config(mut self, config: ChainConfig) -> Self {
        self.chain_config = config;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn TrustValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    fn node_for(&self, record: &VersionRecord) -> Result<VersionNode, LogError> {
        match &self.registry {
            Some(registry) => record.to_materialized_node(registry),
            None => Ok(record.to_node()),
        }
    }

    /// Register an empty partition. Existing partitions are left untouched.
    pub fn create_partition(&self, partition: &PartitionKey) -> Result<(), LogError> {
        let mut state = self.inner.write().map_err(|_| LogError::LockPoisoned)?;
        self.partition_mut(&mut state, partition);
        Ok(())
    }

    /// Append a record, assigning its offset.
    pub fn append(&self, partition: &PartitionKey, record: VersionRecord) -> Result<Ack, LogError> {
        if let Err(reason) = self.validator.validate(partition, &record) {
            warn!(%partition, version = %record.header.version, %reason, "record rejected");
            return Err(LogError::Untrusted(reason));
        }

        let mut state = self.inner.write().map_err(|_| LogError::LockPoisoned)?;
        let log = self.partition_mut(&mut state, partition);

        let mut record = record;
        let offset = log.records.len() as u64;
        record.header.partition_offset = offset;

        let added = log.chain.add(self.node_for(&record)?)?;
        if !added {
            debug!(%partition, version = %record.header.version, "redelivered version");
        }
        let ack = Ack {
            partition: partition.clone(),
            offset,
            version: record.header.version,
        };
        log.records.push(record);
        Ok(ack)
    }

    /// Index a record that already carries its offset, as read back from
    /// durable storage. Offsets must arrive in ascending order.
    pub fn ingest(&self, partition: &PartitionKey, record: VersionRecord) -> Result<(), LogError> {
        if let Err(reason) = self.validator.validate(partition, &record) {
            warn!(%partition, version = %record.header.version, %reason, "record rejected");
            return Err(LogError::Untrusted(reason));
        }
        let mut state = self.inner.write().map_err(|_| LogError::LockPoisoned)?;
        let log = self.partition_mut(&mut state, partition);
        log.chain.add(self.node_for(&record)?)?;
        log.records.push(record);
        Ok(())
    }

    fn partition_mut<'a>(&self, state: &'a mut LogState, partition: &PartitionKey) -> &'a mut PartitionLog {
        state
            .partitions
            .entry(partition.clone())
            .or_insert_with(|| PartitionLog {
                records: Vec::new(),
                chain: Arc::new(PartitionChain::with_config(
                    partition.clone(),
                    self.chain_config.clone(),
                )),
            })
    }
}

#[async_trait]
impl VersionSink for InMemoryVersionLog {
    async fn append_version(
        &self,
        partition: &PartitionKey,
        record: VersionRecord,
    ) -> Result<Ack, LogError> {
        self.append(partition, record)
    }
}

impl VersionReader for InMemoryVersionLog {
    fn partitions(&self) -> Result<Vec<PartitionKey>, LogError> {
        let state = self.inner.read().map_err(|_| LogError::LockPoisoned)?;
        Ok(state.partitions.keys().cloned().collect())
    }

    fn chain(&self, partition: &PartitionKey) -> Result<Option<Arc<PartitionChain>>, LogError> {
        let state = self.inner.read().map_err(|_| LogError::LockPoisoned)?;
        Ok(state.partitions.get(partition).map(|log| log.chain.clone()))
    }

    fn read_all(&self, partition: &PartitionKey) -> Result<Vec<VersionRecord>, LogError> {
        let state = self.inner.read().map_err(|_| LogError::LockPoisoned)?;
        state
            .partitions
            .get(partition)
            .map(|log| log.records.clone())
            .ok_or_else(|| LogError::UnknownPartition(partition.clone()))
    }

    fn record_count(&self, partition: &PartitionKey) -> Result<u64, LogError> {
        let state = self.inner.read().map_err(|_| LogError::LockPoisoned)?;
        state
            .partitions
            .get(partition)
            .map(|log| log.records.len() as u64)
            .ok_or_else(|| LogError::UnknownPartition(partition.clone()))
    }
}
