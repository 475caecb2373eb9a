//! Runner lifecycle manager.
//!
//! [`RunnerPool`] owns every [`RunnerRecord`] ever allocated and drives each
//! one through `Allocated → Connected → Running → Completed | Failed`, with
//! `Released` reachable at any time. Latency is simulated; the work itself is
//! delegated to an [`ExecutionBackend`].
//!
//! Mutations on one runner are serialized by the pool lock, which is never
//! held across an await point, so disjoint runners progress in parallel.
mod error;
pub use error::RunnerError;

mod latency;
pub use latency::LatencyProfile;

mod backend;
pub use backend::{ExecutionBackend, SimulatedExecution};

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use runplane_model::{RunId, RunnerId, RunnerRecord, RunnerState, now};
use tracing::{debug, instrument, trace};

use latency::pause;

/// Thread-safe registry of runners and their lifecycle operations.
pub struct RunnerPool {
    runners: RwLock<HashMap<RunnerId, RunnerRecord>>,
    latency: LatencyProfile,
    backend: Arc<dyn ExecutionBackend>,
}

impl RunnerPool {
    /// Create a pool with the given latency profile and simulated execution.
    pub fn new(latency: LatencyProfile) -> Self {
        Self {
            runners: RwLock::new(HashMap::new()),
            latency,
            backend: Arc::new(SimulatedExecution::new(latency.execute())),
        }
    }

    /// Replace the execution backend.
    pub fn with_backend(mut self, backend: Arc<dyn ExecutionBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Allocate a fresh runner for `label` on behalf of `run_id`.
    ///
    /// The record becomes visible once the allocation latency has elapsed.
    #[instrument(level = "debug", skip(self), fields(run = %run_id))]
    pub async fn allocate(&self, label: &str, run_id: &RunId) -> RunnerRecord {
        pause(self.latency.allocate()).await;

        let record = RunnerRecord::allocated(RunnerId::generate(), label, run_id.clone());
        self.write()
            .insert(record.runner_id.clone(), record.clone());

        debug!(runner = %record.runner_id, "runner allocated");
        record
    }

    /// Snapshot of a single runner.
    pub fn status(&self, runner_id: &RunnerId) -> Result<RunnerRecord, RunnerError> {
        self.read()
            .get(runner_id)
            .cloned()
            .ok_or_else(|| RunnerError::NotFound(runner_id.clone()))
    }

    /// Snapshots of every runner, allocation order.
    pub fn list(&self) -> Vec<RunnerRecord> {
        let mut all: Vec<_> = self.read().values().cloned().collect();
        all.sort_by(|a, b| {
            a.allocated_at
                .cmp(&b.allocated_at)
                .then_with(|| a.runner_id.cmp(&b.runner_id))
        });
        all
    }

    /// Number of runners ever allocated.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Connect an allocated runner.
    #[instrument(level = "debug", skip(self), fields(runner = %runner_id))]
    pub async fn connect(&self, runner_id: &RunnerId) -> Result<RunnerRecord, RunnerError> {
        self.status(runner_id)?;
        pause(self.latency.connect()).await;

        self.transition(runner_id, RunnerState::Allocated, RunnerState::Connected, |r| {
            r.connected_at = Some(now());
        })
    }

    /// Execute the job on a connected runner.
    ///
    /// Returns the final record, `Completed` or `Failed`. `Err` is reserved for
    /// unknown runners and illegal transitions.
    #[instrument(level = "debug", skip(self), fields(runner = %runner_id))]
    pub async fn execute(&self, runner_id: &RunnerId) -> Result<RunnerRecord, RunnerError> {
        let running =
            self.transition(runner_id, RunnerState::Connected, RunnerState::Running, |_| {})?;

        let outcome = self.backend.execute(&running).await;

        match outcome {
            Ok(()) => self.transition(runner_id, RunnerState::Running, RunnerState::Completed, |r| {
                r.completed_at = Some(now());
            }),
            Err(e) => {
                debug!(backend = self.backend.name(), error = %e, "runner execution failed");
                self.transition(runner_id, RunnerState::Running, RunnerState::Failed, |r| {
                    r.fail(e.to_string());
                })
            }
        }
    }

    /// Release a runner. Unknown ids and repeated calls are no-ops.
    pub fn release(&self, runner_id: &RunnerId) {
        if let Some(record) = self.write().get_mut(runner_id) {
            record.state = RunnerState::Released;
            debug!(runner = %runner_id, "runner released");
        } else {
            trace!(runner = %runner_id, "release of unknown runner ignored");
        }
    }

    /// Mark a runner `Failed` unless it already reached a terminal state.
    ///
    /// Returns the resulting snapshot, `None` for unknown ids.
    pub fn fail(&self, runner_id: &RunnerId, reason: impl Into<String>) -> Option<RunnerRecord> {
        let mut guard = self.write();
        let record = guard.get_mut(runner_id)?;
        if !record.state.is_terminal() {
            record.fail(reason);
        }
        Some(record.clone())
    }

    /// Atomically move `runner_id` from `from` to `to`, applying `f` under the lock.
    fn transition<F>(
        &self,
        runner_id: &RunnerId,
        from: RunnerState,
        to: RunnerState,
        f: F,
    ) -> Result<RunnerRecord, RunnerError>
    where
        F: FnOnce(&mut RunnerRecord),
    {
        let mut guard = self.write();
        let record = guard
            .get_mut(runner_id)
            .ok_or_else(|| RunnerError::NotFound(runner_id.clone()))?;

        if record.state != from {
            return Err(RunnerError::InvalidTransition {
                runner_id: runner_id.clone(),
                from: record.state,
                to,
            });
        }
        record.state = to;
        f(record);

        trace!(runner = %runner_id, %from, %to, "runner transition");
        Ok(record.clone())
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<RunnerId, RunnerRecord>> {
        self.runners.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<RunnerId, RunnerRecord>> {
        self.runners.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RunnerPool {
    fn default() -> Self {
        Self::new(LatencyProfile::default())
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, time::Duration};

    use async_trait::async_trait;

    use super::*;

    /// Backend failing every runner allocated for the "broken" label.
    struct FailOnLabel(&'static str);

    #[async_trait]
    impl ExecutionBackend for FailOnLabel {
        fn name(&self) -> &'static str {
            "fail-on-label"
        }

        async fn execute(&self, runner: &RunnerRecord) -> Result<(), RunnerError> {
            if runner.label == self.0 {
                return Err(RunnerError::Upstream {
                    runner_id: runner.runner_id.clone(),
                    reason: "exit code 1".into(),
                });
            }
            Ok(())
        }
    }

    fn run_id() -> RunId {
        RunId::from("run-test")
    }

    #[tokio::test(start_paused = true)]
    async fn happy_path_reaches_completed() {
        let pool = RunnerPool::default();

        let rec = pool.allocate("ubuntu-latest", &run_id()).await;
        assert_eq!(rec.state, RunnerState::Allocated);
        assert!(rec.allocated_at.is_some());

        let rec = pool.connect(&rec.runner_id).await.unwrap();
        assert_eq!(rec.state, RunnerState::Connected);
        assert!(rec.connected_at.is_some());

        let rec = pool.execute(&rec.runner_id).await.unwrap();
        assert_eq!(rec.state, RunnerState::Completed);
        assert!(rec.completed_at.is_some());
        assert_eq!(pool.status(&rec.runner_id).unwrap(), rec);
    }

    #[tokio::test(start_paused = true)]
    async fn allocation_waits_for_latency() {
        let pool = RunnerPool::default();
        let start = tokio::time::Instant::now();

        pool.allocate("x", &run_id()).await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn allocated_ids_are_distinct() {
        let pool = RunnerPool::new(LatencyProfile::instant());
        let mut ids = HashSet::new();
        for _ in 0..100 {
            ids.insert(pool.allocate("x", &run_id()).await.runner_id);
        }
        assert_eq!(ids.len(), 100);
        assert_eq!(pool.len(), 100);
    }

    #[tokio::test]
    async fn unknown_runner_is_not_found() {
        let pool = RunnerPool::new(LatencyProfile::instant());
        let id = RunnerId::from("runner-missing");

        assert!(matches!(pool.status(&id), Err(RunnerError::NotFound(_))));
        assert!(matches!(pool.connect(&id).await, Err(RunnerError::NotFound(_))));
        assert!(matches!(pool.execute(&id).await, Err(RunnerError::NotFound(_))));
    }

    #[tokio::test]
    async fn execute_requires_connect_first() {
        let pool = RunnerPool::new(LatencyProfile::instant());
        let rec = pool.allocate("x", &run_id()).await;

        let err = pool.execute(&rec.runner_id).await.unwrap_err();
        assert!(matches!(
            err,
            RunnerError::InvalidTransition {
                from: RunnerState::Allocated,
                to: RunnerState::Running,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let pool = RunnerPool::new(LatencyProfile::instant());
        let rec = pool.allocate("x", &run_id()).await;

        pool.release(&rec.runner_id);
        pool.release(&rec.runner_id);
        assert_eq!(pool.status(&rec.runner_id).unwrap().state, RunnerState::Released);

        pool.release(&RunnerId::from("runner-unknown"));
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn released_runner_cannot_connect() {
        let pool = RunnerPool::new(LatencyProfile::instant());
        let rec = pool.allocate("x", &run_id()).await;
        pool.release(&rec.runner_id);

        let err = pool.connect(&rec.runner_id).await.unwrap_err();
        assert!(matches!(
            err,
            RunnerError::InvalidTransition {
                from: RunnerState::Released,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn backend_error_fails_runner() {
        let pool = RunnerPool::new(LatencyProfile::instant())
            .with_backend(Arc::new(FailOnLabel("broken")));

        let rec = pool.allocate("broken", &run_id()).await;
        pool.connect(&rec.runner_id).await.unwrap();
        let rec = pool.execute(&rec.runner_id).await.unwrap();

        assert_eq!(rec.state, RunnerState::Failed);
        assert!(rec.completed_at.is_some());
        assert!(rec.error.as_deref().unwrap().contains("exit code 1"));
    }

    #[tokio::test]
    async fn fail_does_not_override_terminal_state() {
        let pool = RunnerPool::new(LatencyProfile::instant());
        let rec = pool.allocate("x", &run_id()).await;
        pool.release(&rec.runner_id);

        let after = pool.fail(&rec.runner_id, "late").unwrap();
        assert_eq!(after.state, RunnerState::Released);
        assert!(pool.fail(&RunnerId::from("runner-unknown"), "x").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn disjoint_runners_progress_in_parallel() {
        let pool = Arc::new(RunnerPool::default());
        let start = tokio::time::Instant::now();

        let mut set = tokio::task::JoinSet::new();
        for _ in 0..10 {
            let pool = Arc::clone(&pool);
            set.spawn(async move {
                let rec = pool.allocate("x", &run_id()).await;
                pool.connect(&rec.runner_id).await?;
                pool.execute(&rec.runner_id).await
            });
        }
        while let Some(res) = set.join_next().await {
            assert_eq!(res.unwrap().unwrap().state, RunnerState::Completed);
        }

        // 100 + 200 + 500 ms once, not ten times over.
        assert!(start.elapsed() < Duration::from_millis(1_600));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn racing_connects_on_one_runner_have_one_winner() {
        let pool = Arc::new(RunnerPool::new(LatencyProfile::instant()));
        let rec = pool.allocate("x", &run_id()).await;

        let mut set = tokio::task::JoinSet::new();
        for _ in 0..32 {
            let pool = Arc::clone(&pool);
            let id = rec.runner_id.clone();
            set.spawn(async move { pool.connect(&id).await });
        }

        let mut winners = 0;
        while let Some(res) = set.join_next().await {
            match res.unwrap() {
                Ok(r) => {
                    assert_eq!(r.state, RunnerState::Connected);
                    winners += 1;
                }
                Err(e) => assert!(
                    matches!(
                        e,
                        RunnerError::InvalidTransition {
                            from: RunnerState::Connected,
                            ..
                        }
                    ),
                    "unexpected error: {e}"
                ),
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(pool.status(&rec.runner_id).unwrap().state, RunnerState::Connected);
    }
}
