use async_trait::async_trait;
use runplane_core::RunSubscription;
use runplane_model::{RunId, RunResult, RunState, RunStatus, RunnerId, RunnerRecord, WorkflowSpec};

use crate::error::ApiError;

/// Backend of the HTTP API.
///
/// [`crate::OrchestratorAdapter`] is the stock implementation; wrap or replace
/// it to add concerns such as auth or rate limiting.
#[async_trait]
pub trait ApiHandler: Send + Sync + 'static {
    /// Accept a workflow; the run continues in the background.
    async fn submit_run(&self, workflow: WorkflowSpec) -> Result<RunResult, ApiError>;

    async fn get_run(&self, id: &RunId) -> Result<Option<RunStatus>, ApiError>;

    /// All runs, or only those in `state`.
    async fn list_runs(&self, state: Option<RunState>) -> Result<Vec<RunStatus>, ApiError>;

    /// Cancel an in-flight run. Already finished runs are a conflict.
    async fn cancel_run(&self, id: &RunId) -> Result<(), ApiError>;

    async fn subscribe_run(&self, id: &RunId) -> RunSubscription;

    async fn subscribe_all(&self) -> RunSubscription;

    async fn allocate_runner(
        &self,
        label: &str,
        run_id: Option<RunId>,
    ) -> Result<RunnerRecord, ApiError>;

    async fn get_runner(&self, id: &RunnerId) -> Result<Option<RunnerRecord>, ApiError>;

    async fn list_runners(&self) -> Result<Vec<RunnerRecord>, ApiError>;

    /// Idempotent.
    async fn release_runner(&self, id: &RunnerId) -> Result<(), ApiError>;
}
