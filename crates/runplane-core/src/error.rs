use thiserror::Error;

use runplane_model::{ModelError, RunId};

use crate::runner::RunnerError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("run not found: {0}")]
    RunNotFound(RunId),

    #[error("invalid workflow: {0}")]
    Validation(String),

    #[error("runner error: {0}")]
    Runner(#[from] RunnerError),
}

impl From<ModelError> for CoreError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::Invalid(msg) => CoreError::Validation(msg),
            other => CoreError::Validation(other.to_string()),
        }
    }
}
