use std::path::Path;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use braid_dag::{ChainConfig, DEFAULT_SEARCH_DEPTH};

use crate::error::{MaintenanceError, Result};

/// Coordinator tuning. Durations are written as milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Grace delay before a scheduled merge or tombstone becomes due.
    #[serde(with = "duration_ms")]
    pub maintenance_window: Duration,
    #[serde(with = "duration_ms")]
    pub min_tick_interval: Duration,
    #[serde(with = "duration_ms")]
    pub max_tick_interval: Duration,
    pub ancestor_search_depth: usize,
    /// Lent rights expire after this many maintenance windows.
    pub lent_rights_ttl_factor: u32,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            maintenance_window: Duration::from_secs(5),
            min_tick_interval: Duration::from_secs(1),
            max_tick_interval: Duration::from_secs(5),
            ancestor_search_depth: DEFAULT_SEARCH_DEPTH,
            lent_rights_ttl_factor: 2,
        }
    }
}

impl MaintenanceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_tick_interval > self.max_tick_interval {
            return Err(MaintenanceError::Config(format!(
                "min_tick_interval ({:?}) exceeds max_tick_interval ({:?})",
                self.min_tick_interval, self.max_tick_interval
            )));
        }
        if self.max_tick_interval.is_zero() {
            return Err(MaintenanceError::Config("max_tick_interval must be positive".into()));
        }
        if self.ancestor_search_depth == 0 {
            return Err(MaintenanceError::Config("ancestor_search_depth must be positive".into()));
        }
        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input).map_err(|e| MaintenanceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let input = std::fs::read_to_string(path).map_err(|source| MaintenanceError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    /// How long lent write grants stay valid.
    pub fn lent_rights_ttl(&self) -> Duration {
        self.maintenance_window.saturating_mul(self.lent_rights_ttl_factor)
    }

    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            ancestor_search_depth: self.ancestor_search_depth,
        }
    }

    /// A random pause in `[min_tick_interval, max_tick_interval]`.
    pub fn next_pause(&self) -> Duration {
        let min = self.min_tick_interval.as_millis() as u64;
        let max = self.max_tick_interval.as_millis() as u64;
        if max <= min {
            return self.min_tick_interval;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
