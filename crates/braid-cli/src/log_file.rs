//! JSON-lines version logs.
//!
//! One record per line:
//!
//! ```text
//! {"partition":"accounts#0","entity":"<uuid>","version":"<uuid>","previous":null,"merges":[],"payload_type":"json","value":{"balance":{"$counter":10}}}
//! ```
//!
//! A missing or null `value` is a tombstone.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;

use braid_dag::ChainConfig;
use braid_ledger::{InMemoryVersionLog, VersionRecord};
use braid_merge::{TypeRegistry, Value};
use braid_types::{EntityId, PartitionKey, VersionHeader, VersionId};

#[derive(Debug, Deserialize)]
struct LogLine {
    partition: String,
    entity: EntityId,
    version: VersionId,
    #[serde(default)]
    previous: Option<VersionId>,
    #[serde(default)]
    merges: Vec<VersionId>,
    #[serde(default = "default_payload_type")]
    payload_type: String,
    #[serde(default)]
    value: Option<serde_json::Value>,
}

fn default_payload_type() -> String {
    "json".to_string()
}

impl LogLine {
    fn into_record(self, registry: &TypeRegistry) -> anyhow::Result<(PartitionKey, VersionRecord)> {
        let partition: PartitionKey = self.partition.parse()?;
        let header = VersionHeader::root(self.entity, self.payload_type)
            .with_version(self.version)
            .with_previous(self.previous)
            .with_merges(self.merges);
        let record = match self.value {
            None | Some(serde_json::Value::Null) => VersionRecord::tombstone(header),
            Some(json) => {
                let payload = registry.encode(&header.payload_type, &Value::from_json(&json))?;
                VersionRecord::new(header, payload)
            }
        };
        Ok((partition, record))
    }
}

/// Parse a JSON-lines log. Blank lines are skipped.
pub fn parse_log(input: &str, registry: &TypeRegistry) -> anyhow::Result<Vec<(PartitionKey, VersionRecord)>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            let parsed: LogLine =
                serde_json::from_str(line).with_context(|| format!("line {}: malformed record", index + 1))?;
            parsed
                .into_record(registry)
                .with_context(|| format!("line {}: invalid record", index + 1))
        })
        .collect()
}

/// Read a JSON-lines log and append every record, in file order.
pub fn load_log(path: &Path, registry: &TypeRegistry, chain: ChainConfig) -> anyhow::Result<InMemoryVersionLog> {
    let input = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let log = InMemoryVersionLog::new()
        .with_chain_config(chain)
        .with_registry(Arc::new(registry.clone()));
    for (partition, record) in parse_log(&input, registry)? {
        log.append(&partition, record)?;
    }
    Ok(log)
}
