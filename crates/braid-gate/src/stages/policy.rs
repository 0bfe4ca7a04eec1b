use serde::{Deserialize, Serialize};

use braid_types::{EntityId, PartitionKey};

use crate::error::GateError;
use crate::stage::{GateContext, GateStage, StageDecision, WriteRequest};

// ---------------------------------------------------------------------------
// Policy types
// ---------------------------------------------------------------------------

/// A named policy containing one or more rules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Must be unique within a gate config.
    pub id: String,
    /// Human-readable policy name.
    pub name: String,
    /// Ordered list of rules that make up this policy.
    pub rules: Vec<PolicyRule>,
    /// Which requests the rules are checked against.
    pub applies_to: PolicyScope,
}

impl Policy {
    /// A policy with no rules.
    pub fn permissive() -> Self {
        Self {
            id: "permissive".into(),
            name: "No restrictions".into(),
            rules: Vec::new(),
            applies_to: PolicyScope::All,
        }
    }

    /// Check whether this policy applies to the given request.
    pub fn applies(&self, request: &WriteRequest) -> bool {
        match &self.applies_to {
            PolicyScope::All => true,
            PolicyScope::Partition(partition) => request.partition == *partition,
            PolicyScope::Principal(name) => request.principal.name == *name,
        }
    }
}

/// Individual rule within a policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyRule {
    /// No writes are accepted on this partition.
    ReadOnlyPartition(PartitionKey),
    /// These entities may not be written.
    DenyEntities(Vec<EntityId>),
    /// Only principals with these names may write.
    AllowPrincipals(Vec<String>),
}

/// Which requests a policy covers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyScope {
    /// Applies to all requests.
    All,
    /// Applies only to writes on this partition.
    Partition(PartitionKey),
    /// Applies only to writes by the named principal.
    Principal(String),
}

// ---------------------------------------------------------------------------
// PolicyStage
// ---------------------------------------------------------------------------

/// Checks the request against every policy whose scope covers it; the
/// first failing rule denies the write.
pub struct PolicyStage;

impl PolicyStage {
    fn evaluate_rule(rule: &PolicyRule, request: &WriteRequest) -> StageDecision {
        match rule {
            PolicyRule::ReadOnlyPartition(partition) => {
                if request.partition == *partition {
                    StageDecision::Fail {
                        reason: format!("partition {partition} is read-only"),
                    }
                } else {
                    StageDecision::Pass
                }
            }

            PolicyRule::DenyEntities(denied) => {
                if denied.contains(&request.entity) {
                    StageDecision::Fail {
                        reason: format!("entity {} is denied by policy", request.entity),
                    }
                } else {
                    StageDecision::Pass
                }
            }

            PolicyRule::AllowPrincipals(allowed) => {
                if allowed.iter().any(|name| *name == request.principal.name) {
                    StageDecision::Pass
                } else {
                    StageDecision::Fail {
                        reason: format!(
                            "principal '{}' is not in the allowed list",
                            request.principal
                        ),
                    }
                }
            }
        }
    }
}

impl GateStage for PolicyStage {
    fn name(&self) -> &str {
        "policy"
    }

    fn evaluate(&self, request: &WriteRequest, context: &GateContext) -> Result<StageDecision, GateError> {
        for policy in &context.policies {
            if !policy.applies(request) {
                continue;
            }

            for rule in &policy.rules {
                let decision = Self::evaluate_rule(rule, request);
                if decision.is_fail() {
                    tracing::debug!(policy = %policy.id, "policy rule failed");
                    return Ok(decision);
                }
            }
        }

        Ok(StageDecision::Pass)
    }
}
