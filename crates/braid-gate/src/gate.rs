use std::time::{Duration, Instant};

use tracing::{debug, warn};

use braid_types::{EntityId, PartitionKey, Principal};

use crate::authority::WriteAuthority;
use crate::config::GateConfig;
use crate::error::GateError;
use crate::stage::{GateContext, GateStage, StageDecision, StageResult, WriteRequest};
use crate::stages::{GrantStage, PolicyStage};

// ---------------------------------------------------------------------------
// GateResult
// ---------------------------------------------------------------------------

/// Final verdict of the gate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    Denied { reason: String },
}

/// The outcome of running a request through the full gate pipeline.
#[derive(Clone, Debug)]
pub struct GateResult {
    /// The final decision.
    pub decision: GateDecision,
    /// Per-stage results in evaluation order.
    pub stage_results: Vec<StageResult>,
    /// Total wall-clock time for the pipeline evaluation.
    pub elapsed: Duration,
}

impl GateResult {
    /// Returns `true` if the write was allowed.
    pub fn is_allowed(&self) -> bool {
        self.decision == GateDecision::Allowed
    }
}

// ---------------------------------------------------------------------------
// WriteGate
// ---------------------------------------------------------------------------

/// The write gate: a configurable pipeline of stages that every write
/// request passes through.
pub struct WriteGate {
    stages: Vec<Box<dyn GateStage>>,
    config: GateConfig,
}

impl WriteGate {
    /// Create a new gate with the given configuration.
    ///
    /// Starts with an empty pipeline. Use [`Self::add_stage`] to add stages,
    /// or [`Self::with_default_stages`] for the standard pipeline.
    pub fn new(config: GateConfig) -> Self {
        Self {
            stages: Vec::new(),
            config,
        }
    }

    /// Create a gate with the default stage pipeline: Grant -> Policy
    pub fn with_default_stages(config: GateConfig) -> Self {
        let mut gate = Self::new(config);
        gate.add_stage(Box::new(GrantStage));
        gate.add_stage(Box::new(PolicyStage));
        gate
    }

    /// Append a stage to the end of the pipeline.
    pub fn add_stage(&mut self, stage: Box<dyn GateStage>) {
        self.stages.push(stage);
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Evaluate a request through the full pipeline.
    ///
    /// The pipeline is **fail-fast**: the first stage that fails or defers
    /// stops evaluation and denies the write. If all stages pass the write
    /// is allowed.
    pub fn evaluate(&self, request: &WriteRequest) -> Result<GateResult, GateError> {
        let pipeline_start = Instant::now();

        if self.config.permissive {
            return Ok(GateResult {
                decision: GateDecision::Allowed,
                stage_results: Vec::new(),
                elapsed: pipeline_start.elapsed(),
            });
        }

        let mut context = GateContext::with_policies(self.config.policies.clone());
        let mut stage_results = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let stage_start = Instant::now();
            let decision = stage.evaluate(request, &context)?;
            let elapsed = stage_start.elapsed();

            let (passed, reason) = match &decision {
                StageDecision::Pass => (true, None),
                StageDecision::Fail { reason } => (false, Some(reason.clone())),
                StageDecision::Defer { reason, .. } => (false, Some(reason.clone())),
            };

            let result = StageResult {
                stage_name: stage.name().to_string(),
                passed,
                reason,
                elapsed,
            };

            stage_results.push(result.clone());
            context.previous_stages.push(result);

            let denial = match decision {
                StageDecision::Pass => continue,
                StageDecision::Fail { reason } => reason,
                StageDecision::Defer { reason, .. } => format!("deferred: {reason}"),
            };
            return Ok(GateResult {
                decision: GateDecision::Denied { reason: denial },
                stage_results,
                elapsed: pipeline_start.elapsed(),
            });
        }

        Ok(GateResult {
            decision: GateDecision::Allowed,
            stage_results,
            elapsed: pipeline_start.elapsed(),
        })
    }
}

impl WriteAuthority for WriteGate {
    fn can_write(&self, principal: &Principal, partition: &PartitionKey, entity: &EntityId) -> bool {
        let request = WriteRequest::new(principal.clone(), partition.clone(), *entity);
        match self.evaluate(&request) {
            Ok(result) => {
                if let GateDecision::Denied { reason } = &result.decision {
                    debug!(principal = %principal, partition = %partition, entity = %entity, %reason, "write denied");
                }
                result.is_allowed()
            }
            Err(e) => {
                warn!(principal = %principal, partition = %partition, entity = %entity, error = %e, "gate evaluation failed");
                false
            }
        }
    }
}
