use thiserror::Error;

use runplane_model::{RunnerId, RunnerState};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("runner not found: {0}")]
    NotFound(RunnerId),

    #[error("runner {runner_id} cannot move from {from} to {to}")]
    InvalidTransition {
        runner_id: RunnerId,
        from: RunnerState,
        to: RunnerState,
    },

    #[error("runner {runner_id} failed: {reason}")]
    Upstream { runner_id: RunnerId, reason: String },

    #[error("runner operation cancelled")]
    Cancelled,
}

impl RunnerError {
    /// Low-cardinality error category used for metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            RunnerError::NotFound(_) => "not_found",
            RunnerError::InvalidTransition { .. } => "invalid_transition",
            RunnerError::Upstream { .. } => "upstream",
            RunnerError::Cancelled => "cancelled",
        }
    }
}
