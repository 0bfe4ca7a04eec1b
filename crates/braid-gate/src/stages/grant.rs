use crate::error::GateError;
use crate::stage::{GateContext, GateStage, StageDecision, WriteRequest};

/// Grant verification stage.
///
/// The principal must hold an unexpired write grant whose scope covers the
/// requested partition and entity.
pub struct GrantStage;

impl GateStage for GrantStage {
    fn name(&self) -> &str {
        "grant"
    }

    fn evaluate(&self, request: &WriteRequest, _context: &GateContext) -> Result<StageDecision, GateError> {
        if request
            .principal
            .holds_grant_for(&request.partition, &request.entity, request.requested_at_ms)
        {
            Ok(StageDecision::Pass)
        } else {
            Ok(StageDecision::Fail {
                reason: format!(
                    "principal '{}' holds no write grant for {} on {}",
                    request.principal, request.entity, request.partition
                ),
            })
        }
    }
}
