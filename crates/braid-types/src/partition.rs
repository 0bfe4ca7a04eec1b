use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The log partition a set of entities lives on.
///
/// Entities never span partitions, so every partition can be consumed,
/// merged and maintained independently of the others.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey {
    /// Name of the topic the partition belongs to.
    pub topic: String,
    /// Index of the partition within its topic.
    pub index: u32,
}

impl PartitionKey {
    /// Create a new partition key.
    pub fn new(topic: impl Into<String>, index: u32) -> Self {
        Self {
            topic: topic.into(),
            index,
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.topic, self.index)
    }
}

impl FromStr for PartitionKey {
    type Err = TypeError;

    /// Parse the `topic#index` form produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (topic, index) = s
            .rsplit_once('#')
            .ok_or_else(|| TypeError::InvalidPartitionKey(s.to_string()))?;
        if topic.is_empty() {
            return Err(TypeError::InvalidPartitionKey(s.to_string()));
        }
        let index = index
            .parse::<u32>()
            .map_err(|e| TypeError::InvalidPartitionKey(format!("{s}: {e}")))?;
        Ok(Self::new(topic, index))
    }
}
