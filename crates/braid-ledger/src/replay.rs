//! Rebuilding version graphs from stored frames.

use braid_dag::{ChainConfig, PartitionChain};
use braid_types::PartitionKey;

use crate::error::LogError;
use crate::record::VersionRecord;

/// Outcome of replaying a partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplaySummary {
    pub partition: PartitionKey,
    pub records: u64,
    pub entities: usize,
    pub forked: usize,
}

/// Decode bincode frames in log order.
pub fn decode_frames<'a, I>(frames: I) -> Result<Vec<VersionRecord>, LogError>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    frames.into_iter().map(VersionRecord::from_bytes).collect()
}

/// Build a fresh chain from records in log order.
pub fn replay_chain(
    partition: PartitionKey,
    config: ChainConfig,
    records: &[VersionRecord],
) -> Result<(PartitionChain, ReplaySummary), LogError> {
    let chain = PartitionChain::with_config(partition.clone(), config);
    for record in records {
        chain.add(record.to_node())?;
    }
    let summary = ReplaySummary {
        partition,
        records: records.len() as u64,
        entities: chain.len(),
        forked: chain.forked_entities().len(),
    };
    Ok((chain, summary))
}
