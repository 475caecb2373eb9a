mod runner;
pub use runner::{RunnerRecord, RunnerState};

mod run;
pub use run::{RunResult, RunState, RunStatus};
