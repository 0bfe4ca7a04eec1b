use std::time::Duration;

use serde::{Deserialize, Serialize};

use braid_types::{unix_millis, EntityId, PartitionKey, Principal};

use crate::error::GateError;
use crate::stages::policy::Policy;

/// A request to append a version of an entity, evaluated by the gate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WriteRequest {
    /// Who is writing.
    pub principal: Principal,
    /// Partition the entity lives on.
    pub partition: PartitionKey,
    /// Entity being written.
    pub entity: EntityId,
    /// When the request was made, in UNIX milliseconds.
    pub requested_at_ms: u64,
}

impl WriteRequest {
    /// A request made now.
    pub fn new(principal: Principal, partition: PartitionKey, entity: EntityId) -> Self {
        Self {
            principal,
            partition,
            entity,
            requested_at_ms: unix_millis(),
        }
    }

    /// Same request, evaluated as of a fixed time.
    pub fn at(mut self, requested_at_ms: u64) -> Self {
        self.requested_at_ms = requested_at_ms;
        self
    }
}

/// What one stage concluded about a write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageDecision {
    Pass,
    /// The write is refused.
    Fail { reason: String },
    /// Not decidable yet; the write is refused for now.
    Defer {
        reason: String,
        retry_after: Duration,
    },
}

impl StageDecision {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail { .. })
    }
}

/// Trace entry for one stage of an evaluation.
#[derive(Clone, Debug)]
pub struct StageResult {
    pub stage_name: String,
    pub passed: bool,
    /// Set when the stage did not pass.
    pub reason: Option<String>,
    pub elapsed: Duration,
}

/// Shared state threaded through one evaluation.
#[derive(Clone, Debug, Default)]
pub struct GateContext {
    pub policies: Vec<Policy>,
    /// Trace of the stages evaluated so far.
    pub previous_stages: Vec<StageResult>,
}

impl GateContext {
    pub fn with_policies(policies: Vec<Policy>) -> Self {
        Self {
            policies,
            previous_stages: Vec::new(),
        }
    }
}

/// One check in the write gate. Stages run in pipeline order and the first
/// one that does not pass decides the outcome.
pub trait GateStage: Send + Sync {
    /// Short name used in traces and denial reasons.
    fn name(&self) -> &str;

    fn evaluate(&self, request: &WriteRequest, context: &GateContext) -> Result<StageDecision, GateError>;
}
