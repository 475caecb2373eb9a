use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown run state: {0}")]
    UnknownRunState(String),

    #[error("unknown runner state: {0}")]
    UnknownRunnerState(String),

    #[error("invalid model: {0}")]
    Invalid(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
