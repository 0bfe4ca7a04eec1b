/// Errors raised while configuring or running the write gate.
///
/// A denied write is not an error; it is reported through
/// [`crate::GateDecision::Denied`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// A stage could not reach a decision.
    #[error("stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },

    /// Two policies share an id.
    #[error("duplicate policy id '{0}'")]
    DuplicatePolicy(String),

    /// A policy can never be satisfied or is otherwise malformed.
    #[error("invalid policy '{id}': {reason}")]
    InvalidPolicy { id: String, reason: String },
}

impl GateError {
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }
}
