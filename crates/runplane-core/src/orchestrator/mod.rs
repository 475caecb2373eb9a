//! Run orchestration: the pipeline from workflow to terminal run status.
//!
//! For one run the [`Orchestrator`]:
//! 1. extracts runner requirements and registers the run;
//! 2. allocates one runner per requirement concurrently (barrier);
//! 3. connects then executes every runner concurrently (barrier);
//! 4. folds the final runner records into `Success` or `Failure`.
//!
//! A failing branch only fails its own runner. Cancellation (per run or on
//! shutdown) interrupts both barriers, releases the allocated runners and ends
//! the run `Cancelled`.
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, PoisonError, RwLock, RwLockWriteGuard},
};

use runplane_model::{
    RunId, RunResult, RunState, RunStatus, RunnerId, RunnerRecord, RunnerRequirement, Timestamp,
    WorkflowSpec, now,
};
use tokio::{task::JoinSet, time::Instant};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    error::CoreError,
    extract::extract_requirements,
    metrics::{MetricsHandle, RunOutcome},
    runner::{RunnerError, RunnerPool},
    state::{RunStatusStore, RunUpdate},
};

pub const MSG_NO_JOBS: &str = "No jobs to execute";
pub const MSG_EXECUTING: &str = "Runners allocated, executing jobs";
pub const MSG_SUCCESS: &str = "All jobs completed successfully";
pub const MSG_FAILURE: &str = "Some jobs failed";
pub const MSG_CANCELLED: &str = "Run cancelled";

/// Coordinates runs over a shared [`RunnerPool`] and [`RunStatusStore`].
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    pool: Arc<RunnerPool>,
    store: Arc<RunStatusStore>,
    metrics: MetricsHandle,
    /// Cancellation tokens of runs that have not reached a terminal state.
    active: RwLock<HashMap<RunId, CancellationToken>>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

/// A registered run waiting for its runner pipeline.
struct PendingRun {
    run_id: RunId,
    start_time: Timestamp,
    started: Instant,
    requirements: Vec<RunnerRequirement>,
    token: CancellationToken,
}

enum Prepared {
    Done(RunResult),
    Pending(PendingRun, RunResult),
}

impl Orchestrator {
    pub fn new(pool: Arc<RunnerPool>, store: Arc<RunStatusStore>, metrics: MetricsHandle) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool,
                store,
                metrics,
                active: RwLock::new(HashMap::new()),
                shutdown: CancellationToken::new(),
                tracker: TaskTracker::new(),
            }),
        }
    }

    pub fn pool(&self) -> &Arc<RunnerPool> {
        &self.inner.pool
    }

    pub fn store(&self) -> &Arc<RunStatusStore> {
        &self.inner.store
    }

    /// Number of runs still in flight.
    pub fn active_runs(&self) -> usize {
        self.inner
            .active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Run `workflow` to completion and return its terminal result.
    pub async fn schedule(&self, workflow: &WorkflowSpec) -> RunResult {
        match self.inner.prepare(workflow) {
            Prepared::Done(result) => result,
            Prepared::Pending(run, _) => self.inner.drive(run).await,
        }
    }

    /// Register `workflow` and continue its pipeline in the background.
    ///
    /// Returns the `Scheduled` result, or the terminal one when the workflow
    /// needs no runners.
    pub async fn submit(&self, workflow: &WorkflowSpec) -> RunResult {
        match self.inner.prepare(workflow) {
            Prepared::Done(result) => result,
            Prepared::Pending(run, ack) => {
                let inner = Arc::clone(&self.inner);
                self.inner.tracker.spawn(async move {
                    inner.drive(run).await;
                });
                ack
            }
        }
    }

    /// Validate `workflow`, then [`submit`](Self::submit) it.
    pub async fn try_submit(&self, workflow: &WorkflowSpec) -> Result<RunResult, CoreError> {
        workflow.validate()?;
        Ok(self.submit(workflow).await)
    }

    /// Request cancellation of an in-flight run.
    ///
    /// Returns `Ok(false)` when the run already reached a terminal state.
    pub fn cancel(&self, run_id: &RunId) -> Result<bool, CoreError> {
        let status = self
            .inner
            .store
            .get(run_id)
            .ok_or_else(|| CoreError::RunNotFound(run_id.clone()))?;
        if status.is_terminal() {
            return Ok(false);
        }

        let active = self
            .inner
            .active
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match active.get(run_id) {
            Some(token) => {
                info!(run = %run_id, "run cancellation requested");
                token.cancel();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Cancel every in-flight run and wait for background pipelines to end.
    pub async fn shutdown(&self) {
        info!(active = self.active_runs(), "orchestrator shutting down");
        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }
}

impl Inner {
    /// Register the run; short-circuits workflows that need no runners.
    #[instrument(level = "debug", skip(self, workflow), fields(name = %workflow.name))]
    fn prepare(&self, workflow: &WorkflowSpec) -> Prepared {
        let run_id = RunId::generate();
        let start_time = now();
        let started = Instant::now();
        let requirements = extract_requirements(workflow);

        self.metrics.record_run_started();

        if requirements.is_empty() {
            self.store.register(run_id.clone(), workflow.name.clone());
            info!(run = %run_id, "run has no jobs to execute");
            let status = self.store.update(
                &run_id,
                RunUpdate::to(RunState::Success)
                    .with_runners(Vec::new())
                    .with_message(MSG_NO_JOBS),
            );
            self.record_completion(RunState::Success, started);
            return Prepared::Done(result_of(&run_id, start_time, status, RunState::Success, MSG_NO_JOBS));
        }

        // Token goes in before the run becomes visible, so a cancel issued
        // right after registration is never missed.
        let token = self.shutdown.child_token();
        self.active_mut().insert(run_id.clone(), token.clone());
        let status = self.store.register(run_id.clone(), workflow.name.clone());

        info!(run = %run_id, runners = requirements.len(), "run scheduled");
        let ack = RunResult {
            run_id: run_id.clone(),
            state: status.state,
            start_time,
            end_time: None,
            runners: Vec::new(),
            message: status.message,
        };

        Prepared::Pending(
            PendingRun {
                run_id,
                start_time,
                started,
                requirements,
                token,
            },
            ack,
        )
    }

    /// Both fan-out barriers followed by aggregation.
    #[instrument(level = "debug", skip(self, run), fields(run = %run.run_id))]
    async fn drive(&self, run: PendingRun) -> RunResult {
        let allocation = self.allocate_all(&run).await;

        if allocation.cancelled || run.token.is_cancelled() {
            return self.finish_cancelled(&run, &allocation.runners);
        }

        self.store.update(
            &run.run_id,
            RunUpdate::to(RunState::Running)
                .with_runners(allocation.runners.clone())
                .with_message(MSG_EXECUTING),
        );

        let execution = self.execute_all(&run, &allocation.runners).await;

        // A cancel that arrives once every branch has reported cannot stop
        // any work, so the verdict stands.
        if execution.cancelled {
            return self.finish_cancelled(&run, &allocation.runners);
        }

        let success = !allocation.failed
            && execution.runners.len() == run.requirements.len()
            && execution.runners.iter().all(RunnerRecord::is_completed);
        let (state, message) = if success {
            (RunState::Success, MSG_SUCCESS)
        } else {
            (RunState::Failure, MSG_FAILURE)
        };

        self.finish(&run, state, message, execution.runners)
    }

    async fn allocate_all(&self, run: &PendingRun) -> Barrier {
        let mut set = JoinSet::new();
        for req in &run.requirements {
            let pool = Arc::clone(&self.pool);
            let token = run.token.clone();
            let run_id = run.run_id.clone();
            let label = req.required_label.clone();

            set.spawn(async move {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(RunnerError::Cancelled),
                    record = pool.allocate(&label, &run_id) => Ok(record),
                }
            });
        }

        let mut barrier = Barrier::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(record)) => barrier.runners.push(record),
                Ok(Err(_)) => barrier.cancelled = true,
                Err(e) => {
                    error!(run = %run.run_id, error = %e, "allocation branch aborted");
                    self.metrics.record_runner_error("allocate", "join");
                    barrier.failed = true;
                }
            }
        }
        barrier
    }

    async fn execute_all(&self, run: &PendingRun, runners: &[RunnerRecord]) -> Barrier {
        let mut set = JoinSet::new();
        let mut outstanding: HashSet<RunnerId> = HashSet::with_capacity(runners.len());

        for record in runners {
            let pool = Arc::clone(&self.pool);
            let token = run.token.clone();
            let runner_id = record.runner_id.clone();
            outstanding.insert(runner_id.clone());

            set.spawn(async move {
                let res = tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(("execute", RunnerError::Cancelled)),
                    res = connect_and_execute(&pool, &runner_id) => res,
                };
                (runner_id, res)
            });
        }

        let mut barrier = Barrier::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((runner_id, Ok(record))) => {
                    outstanding.remove(&runner_id);
                    barrier.runners.push(record);
                }
                Ok((runner_id, Err((_, RunnerError::Cancelled)))) => {
                    outstanding.remove(&runner_id);
                    barrier.cancelled = true;
                }
                Ok((runner_id, Err((stage, e)))) => {
                    outstanding.remove(&runner_id);
                    warn!(run = %run.run_id, runner = %runner_id, stage, error = %e, "runner branch failed");
                    self.metrics.record_runner_error(stage, e.kind());
                    self.fold_failure(&mut barrier, &runner_id, e.to_string());
                }
                Err(e) => {
                    error!(run = %run.run_id, error = %e, "runner branch aborted");
                    self.metrics.record_runner_error("execute", "join");
                }
            }
        }

        // Branches that never reported back panicked.
        for runner_id in outstanding {
            self.fold_failure(&mut barrier, &runner_id, "runner task aborted".to_string());
        }
        barrier
    }

    fn fold_failure(&self, barrier: &mut Barrier, runner_id: &RunnerId, reason: String) {
        match self.pool.fail(runner_id, reason) {
            Some(record) => barrier.runners.push(record),
            None => barrier.failed = true,
        }
    }

    fn finish_cancelled(&self, run: &PendingRun, allocated: &[RunnerRecord]) -> RunResult {
        let runners = allocated
            .iter()
            .map(|r| {
                self.pool.release(&r.runner_id);
                self.pool.status(&r.runner_id).unwrap_or_else(|_| r.clone())
            })
            .collect();
        self.finish(run, RunState::Cancelled, MSG_CANCELLED, runners)
    }

    fn finish(
        &self,
        run: &PendingRun,
        state: RunState,
        message: &str,
        runners: Vec<RunnerRecord>,
    ) -> RunResult {
        let status = self.store.update(
            &run.run_id,
            RunUpdate::to(state)
                .with_runners(runners)
                .with_message(message),
        );
        self.active_mut().remove(&run.run_id);
        self.record_completion(state, run.started);

        match state {
            RunState::Failure => warn!(run = %run.run_id, %state, message, "run finished"),
            _ => info!(run = %run.run_id, %state, message, "run finished"),
        }
        result_of(&run.run_id, run.start_time, status, state, message)
    }

    fn record_completion(&self, state: RunState, started: Instant) {
        if let Some(outcome) = RunOutcome::from_state(state) {
            let ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            self.metrics.record_run_completed(outcome, ms);
        }
    }

    fn active_mut(&self) -> RwLockWriteGuard<'_, HashMap<RunId, CancellationToken>> {
        self.active.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Outcome of one fan-out barrier.
#[derive(Default)]
struct Barrier {
    /// Final records, in completion order.
    runners: Vec<RunnerRecord>,
    /// A branch observed cancellation.
    cancelled: bool,
    /// A branch was lost without a runner record to show for it.
    failed: bool,
}

async fn connect_and_execute(
    pool: &RunnerPool,
    runner_id: &RunnerId,
) -> Result<RunnerRecord, (&'static str, RunnerError)> {
    pool.connect(runner_id).await.map_err(|e| ("connect", e))?;
    let record = pool.execute(runner_id).await.map_err(|e| ("execute", e))?;
    debug!(runner = %runner_id, state = %record.state, "runner finished");
    Ok(record)
}

fn result_of(
    run_id: &RunId,
    start_time: Timestamp,
    status: Option<RunStatus>,
    state: RunState,
    message: &str,
) -> RunResult {
    match status {
        Some(status) => RunResult {
            run_id: status.run_id,
            state: status.state,
            start_time,
            end_time: status.completed_at,
            runners: status.runners,
            message: status.message,
        },
        None => RunResult {
            run_id: run_id.clone(),
            state,
            start_time,
            end_time: Some(now()),
            runners: Vec::new(),
            message: message.to_string(),
        },
    }
}
