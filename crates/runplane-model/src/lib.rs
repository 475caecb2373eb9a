mod domain;
pub use domain::{RUN_ID_PREFIX, RUNNER_ID_PREFIX};
pub use domain::{Label, RunId, RunnerId, Timestamp, now};

mod error;
pub use error::{ModelError, ModelResult};

mod spec;
pub use spec::{JobEntry, JobSpec, RunnerRequirement, StepSpec, WorkflowSpec};

mod state;
pub use state::{RunResult, RunState, RunStatus, RunnerRecord, RunnerState};
