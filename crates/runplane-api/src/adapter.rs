use async_trait::async_trait;
use runplane_core::{Orchestrator, RunSubscription, RunnerError};
use runplane_model::{RunId, RunResult, RunState, RunStatus, RunnerId, RunnerRecord, WorkflowSpec};

use crate::{error::ApiError, handler::ApiHandler};

/// [`ApiHandler`] delegating to an [`Orchestrator`] and its pool and store.
#[derive(Clone)]
pub struct OrchestratorAdapter {
    orchestrator: Orchestrator,
}

impl OrchestratorAdapter {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl ApiHandler for OrchestratorAdapter {
    async fn submit_run(&self, workflow: WorkflowSpec) -> Result<RunResult, ApiError> {
        Ok(self.orchestrator.try_submit(&workflow).await?)
    }

    async fn get_run(&self, id: &RunId) -> Result<Option<RunStatus>, ApiError> {
        Ok(self.orchestrator.store().get(id))
    }

    async fn list_runs(&self, state: Option<RunState>) -> Result<Vec<RunStatus>, ApiError> {
        let store = self.orchestrator.store();
        Ok(match state {
            Some(state) => store.list_by_state(state),
            None => store.list(),
        })
    }

    async fn cancel_run(&self, id: &RunId) -> Result<(), ApiError> {
        if self.orchestrator.cancel(id)? {
            Ok(())
        } else {
            Err(ApiError::Conflict(format!("run {id} already finished")))
        }
    }

    async fn subscribe_run(&self, id: &RunId) -> RunSubscription {
        self.orchestrator.store().subscribe(id)
    }

    async fn subscribe_all(&self) -> RunSubscription {
        self.orchestrator.store().subscribe_all()
    }

    async fn allocate_runner(
        &self,
        label: &str,
        run_id: Option<RunId>,
    ) -> Result<RunnerRecord, ApiError> {
        let run_id = run_id.unwrap_or_else(RunId::generate);
        Ok(self.orchestrator.pool().allocate(label, &run_id).await)
    }

    async fn get_runner(&self, id: &RunnerId) -> Result<Option<RunnerRecord>, ApiError> {
        match self.orchestrator.pool().status(id) {
            Ok(record) => Ok(Some(record)),
            Err(RunnerError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_runners(&self) -> Result<Vec<RunnerRecord>, ApiError> {
        Ok(self.orchestrator.pool().list())
    }

    async fn release_runner(&self, id: &RunnerId) -> Result<(), ApiError> {
        self.orchestrator.pool().release(id);
        Ok(())
    }
}
