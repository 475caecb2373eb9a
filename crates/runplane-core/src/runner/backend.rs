use std::time::Duration;

use async_trait::async_trait;
use runplane_model::RunnerRecord;

use crate::runner::{RunnerError, latency::pause};

/// Performs the actual work of a runner once it is connected.
///
/// `Ok(())` completes the runner, any error fails it. Implementations must
/// suspend rather than block the calling thread.
#[async_trait]
pub trait ExecutionBackend: Send + Sync + 'static {
    /// Backend name used in logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Execute the job assigned to `runner`.
    async fn execute(&self, runner: &RunnerRecord) -> Result<(), RunnerError>;
}

/// Backend that only waits for a fixed delay and always succeeds.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedExecution {
    delay: Duration,
}

impl SimulatedExecution {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl ExecutionBackend for SimulatedExecution {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn execute(&self, _runner: &RunnerRecord) -> Result<(), RunnerError> {
        pause(self.delay).await;
        Ok(())
    }
}
