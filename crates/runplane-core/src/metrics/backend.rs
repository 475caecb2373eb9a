use std::sync::Arc;

use runplane_model::RunState;

/// Terminal outcome of a run for metrics classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every runner completed.
    Success,
    /// At least one runner failed.
    Failure,
    /// Run was cancelled before it finished.
    Cancelled,
}

impl RunOutcome {
    /// Return label value for metrics.
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            RunOutcome::Success => "success",
            RunOutcome::Failure => "failure",
            RunOutcome::Cancelled => "cancelled",
        }
    }

    /// Outcome for a terminal run state, `None` otherwise.
    pub fn from_state(state: RunState) -> Option<Self> {
        match state {
            RunState::Success => Some(RunOutcome::Success),
            RunState::Failure => Some(RunOutcome::Failure),
            RunState::Cancelled => Some(RunOutcome::Cancelled),
            RunState::Scheduled | RunState::Running => None,
        }
    }
}

/// Backend metrics collection interface.
///
/// Implementations are handed to the [`crate::Orchestrator`] and invoked from
/// every run pipeline.
pub trait MetricsBackend: Send + Sync + 'static {
    /// Record a run entering the pipeline.
    ///
    /// Called once per run, before runners are allocated.
    fn record_run_started(&self);
    /// Record run completion with outcome and wall-clock duration.
    ///
    /// # Arguments
    /// - `outcome`: How the run terminated
    /// - `duration_ms`: Time from scheduling to the terminal state
    fn record_run_completed(&self, outcome: RunOutcome, duration_ms: u64);
    /// Record a runner lifecycle error.
    ///
    /// This is separate from run failures (which are `record_run_completed` with `Failure`).
    ///
    /// # Arguments
    /// - `stage`: Lifecycle step that failed (`connect`, `execute`...)
    /// - `error_kind`: Error category
    fn record_runner_error(&self, stage: &str, error_kind: &str);
}

/// Shared handle to metrics backend.
pub type MetricsHandle = Arc<dyn MetricsBackend>;
