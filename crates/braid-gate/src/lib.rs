//! Write authorization for Braid.
//!
//! Every version the merge coordinator commits is first checked against a
//! [`WriteAuthority`]. The standard authority is [`WriteGate`], a fail-fast
//! pipeline of stages: the principal must hold a covering write grant, and
//! every applicable partition policy must pass.
//!
//! # Quick Start
//!
//! ```rust
//! use braid_gate::{GateConfig, WriteAuthority, WriteGate};
//! use braid_types::{EntityId, GrantScope, PartitionKey, Principal, WriteGrant};
//!
//! let gate = WriteGate::with_default_stages(GateConfig::default());
//! let partition = PartitionKey::new("accounts", 0);
//! let writer = Principal::new("alice")
//!     .with_grant(WriteGrant::new(GrantScope::Partition(partition.clone())));
//! assert!(gate.can_write(&writer, &partition, &EntityId::new()));
//! ```

pub mod authority;
pub mod config;
pub mod error;
pub mod gate;
pub mod stage;
pub mod stages;

pub use authority::{AllowAll, DenyAll, WriteAuthority};
pub use config::GateConfig;
pub use error::GateError;
pub use gate::{GateDecision, GateResult, WriteGate};
pub use stage::{GateContext, GateStage, StageDecision, StageResult, WriteRequest};
pub use stages::grant::GrantStage;
pub use stages::policy::{Policy, PolicyRule, PolicyScope, PolicyStage};

#[cfg(test)]
mod tests {
    use super::*;
    use braid_types::{EntityId, GrantScope, PartitionKey, Principal, WriteGrant};

    fn partition() -> PartitionKey {
        PartitionKey::new("accounts", 0)
    }

    fn granted(name: &str) -> Principal {
        Principal::new(name).with_grant(WriteGrant::new(GrantScope::Partition(partition())))
    }

    fn make_request(principal: Principal) -> WriteRequest {
        WriteRequest::new(principal, partition(), EntityId::from_u128(1))
    }

    // -----------------------------------------------------------------------
    // Pipeline
    // -----------------------------------------------------------------------

    #[test]
    fn default_gate_allows_granted_principal() {
        let gate = WriteGate::with_default_stages(GateConfig::default());
        let result = gate.evaluate(&make_request(granted("alice"))).unwrap();
        assert!(result.is_allowed());
        assert_eq!(result.stage_results.len(), 2);
        assert!(result.stage_results.iter().all(|r| r.passed));
    }

    #[test]
    fn pipeline_is_fail_fast() {
        let config = GateConfig::default().with_policy(Policy {
            id: "freeze".into(),
            name: "Freeze".into(),
            rules: vec![PolicyRule::ReadOnlyPartition(partition())],
            applies_to: PolicyScope::All,
        });
        let gate = WriteGate::with_default_stages(config);
        let result = gate.evaluate(&make_request(Principal::new("nobody"))).unwrap();
        assert!(!result.is_allowed());
        assert_eq!(result.stage_results.len(), 1);
        assert_eq!(result.stage_results[0].stage_name, "grant");
    }

    #[test]
    fn policy_denies_after_grant_passes() {
        let config = GateConfig::default().with_policy(Policy {
            id: "freeze".into(),
            name: "Freeze".into(),
            rules: vec![PolicyRule::ReadOnlyPartition(partition())],
            applies_to: PolicyScope::All,
        });
        let gate = WriteGate::with_default_stages(config);
        let result = gate.evaluate(&make_request(granted("alice"))).unwrap();
        assert!(!result.is_allowed());
        let policy = result
            .stage_results
            .iter()
            .find(|r| r.stage_name == "policy")
            .unwrap();
        assert!(policy.reason.as_deref().unwrap().contains("read-only"));
    }

    #[test]
    fn permissive_mode_allows_all() {
        let gate = WriteGate::with_default_stages(GateConfig::permissive());
        let result = gate.evaluate(&make_request(Principal::new("nobody"))).unwrap();
        assert!(result.is_allowed());
        assert!(result.stage_results.is_empty());
    }

    #[test]
    fn empty_pipeline_allows() {
        let gate = WriteGate::new(GateConfig::default());
        assert_eq!(gate.stage_count(), 0);
        assert!(gate.evaluate(&make_request(Principal::new("x"))).unwrap().is_allowed());
    }

    #[test]
    fn deferring_stage_denies() {
        struct Later;
        impl GateStage for Later {
            fn name(&self) -> &str {
                "later"
            }
            fn evaluate(&self, _: &WriteRequest, _: &GateContext) -> Result<StageDecision, GateError> {
                Ok(StageDecision::Defer {
                    reason: "busy".into(),
                    retry_after: std::time::Duration::from_secs(1),
                })
            }
        }

        let mut gate = WriteGate::new(GateConfig::default());
        gate.add_stage(Box::new(Later));
        let result = gate.evaluate(&make_request(Principal::new("x"))).unwrap();
        assert_eq!(
            result.decision,
            GateDecision::Denied {
                reason: "deferred: busy".into()
            }
        );
    }

    // -----------------------------------------------------------------------
    // WriteAuthority
    // -----------------------------------------------------------------------

    #[test]
    fn can_write_follows_evaluation() {
        let gate = WriteGate::with_default_stages(GateConfig::default());
        let entity = EntityId::new();
        assert!(gate.can_write(&granted("alice"), &partition(), &entity));
        assert!(!gate.can_write(&Principal::new("bob"), &partition(), &entity));
    }

    #[test]
    fn stage_errors_deny() {
        struct Broken;
        impl GateStage for Broken {
            fn name(&self) -> &str {
                "broken"
            }
            fn evaluate(&self, _: &WriteRequest, _: &GateContext) -> Result<StageDecision, GateError> {
                Err(GateError::stage("broken", "no backend"))
            }
        }

        let mut gate = WriteGate::new(GateConfig::default());
        gate.add_stage(Box::new(Broken));
        assert!(!gate.can_write(&granted("alice"), &partition(), &EntityId::new()));
    }
}
