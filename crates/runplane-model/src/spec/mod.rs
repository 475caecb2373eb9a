mod workflow;
pub use workflow::{JobEntry, JobSpec, StepSpec, WorkflowSpec};

mod requirement;
pub use requirement::RunnerRequirement;
