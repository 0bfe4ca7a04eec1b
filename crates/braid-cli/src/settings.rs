use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use braid_gate::GateConfig;
use braid_maintenance::MaintenanceConfig;

/// Contents of the `--config` file.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub maintenance: MaintenanceConfig,
    /// Without a `[gate]` section every maintenance write is allowed.
    pub gate: Option<GateConfig>,
}

impl Settings {
    pub fn parse(input: &str) -> anyhow::Result<Self> {
        let settings: Self = toml::from_str(input)?;
        settings.maintenance.validate()?;
        if let Some(gate) = &settings.gate {
            gate.validate()?;
        }
        Ok(settings)
    }

    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let input = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&input).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn gate(&self) -> GateConfig {
        self.gate.clone().unwrap_or_else(GateConfig::permissive)
    }
}
