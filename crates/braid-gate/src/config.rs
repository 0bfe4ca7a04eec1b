use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::GateError;
use crate::stages::policy::{Policy, PolicyRule};

/// Configuration for the write gate.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// When `true`, every write is allowed without running any stage.
    pub permissive: bool,
    /// Policies evaluated by the policy stage.
    pub policies: Vec<Policy>,
}

impl GateConfig {
    /// Allow every write; used by offline tooling and tests.
    pub fn permissive() -> Self {
        Self {
            permissive: true,
            ..Default::default()
        }
    }

    /// Add a policy.
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policies.push(policy);
        self
    }

    /// Reject duplicate policy ids and allow-lists that admit nobody.
    pub fn validate(&self) -> Result<(), GateError> {
        let mut ids = HashSet::new();
        for policy in &self.policies {
            if !ids.insert(policy.id.as_str()) {
                return Err(GateError::DuplicatePolicy(policy.id.clone()));
            }
            for rule in &policy.rules {
                if let PolicyRule::AllowPrincipals(names) = rule {
                    if names.is_empty() {
                        return Err(GateError::InvalidPolicy {
                            id: policy.id.clone(),
                            reason: "empty principal allow-list".into(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
