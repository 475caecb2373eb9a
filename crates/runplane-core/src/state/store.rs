use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use runplane_model::{RunId, RunState, RunStatus, RunnerRecord, now};
use tracing::{debug, trace};

use super::{EventBus, RunSubscription, SubscriptionConfig};

/// Run records shared with per-run subscriptions.
pub(crate) type RunMap = Arc<RwLock<HashMap<RunId, RunStatus>>>;

/// Mutation applied by [`RunStatusStore::update`].
#[derive(Clone, Debug, PartialEq)]
pub struct RunUpdate {
    pub state: RunState,
    /// Replaces the runner list when set.
    pub runners: Option<Vec<RunnerRecord>>,
    /// Replaces the message when set.
    pub message: Option<String>,
}

impl RunUpdate {
    /// Move the run to `state`, leaving runners and message untouched.
    pub fn to(state: RunState) -> Self {
        Self {
            state,
            runners: None,
            message: None,
        }
    }

    pub fn with_runners(mut self, runners: Vec<RunnerRecord>) -> Self {
        self.runners = Some(runners);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// In-memory store of run statuses.
///
/// Every write is broadcast on the bus while the write lock is held, so
/// events for one run reach each receiver in mutation order.
#[derive(Debug)]
pub struct RunStatusStore {
    runs: RunMap,
    bus: EventBus,
    config: SubscriptionConfig,
}

impl RunStatusStore {
    pub fn new() -> Self {
        Self::with_config(EventBus::default(), SubscriptionConfig::default())
    }

    pub fn with_config(bus: EventBus, config: SubscriptionConfig) -> Self {
        Self {
            runs: Arc::new(RwLock::new(HashMap::new())),
            bus,
            config,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn config(&self) -> &SubscriptionConfig {
        &self.config
    }

    /// Store a fresh `Scheduled` record for `run_id` and broadcast it.
    pub fn register(&self, run_id: RunId, name: impl Into<String>) -> RunStatus {
        let status = RunStatus {
            run_id: run_id.clone(),
            name: name.into(),
            state: RunState::Scheduled,
            scheduled_at: now(),
            started_at: None,
            completed_at: None,
            runners: Vec::new(),
            message: "Scheduled".to_string(),
        };

        let mut guard = self.write();
        guard.insert(run_id, status.clone());
        self.bus.publish(status.clone());

        debug!(run = %status.run_id, name = %status.name, "run registered");
        status
    }

    /// Apply `update` to a stored run and broadcast the result.
    ///
    /// Unknown ids are ignored. `started_at` and `completed_at` are stamped
    /// once, on the first entry into `Running` or a terminal state.
    pub fn update(&self, run_id: &RunId, update: RunUpdate) -> Option<RunStatus> {
        let mut guard = self.write();
        let Some(status) = guard.get_mut(run_id) else {
            trace!(run = %run_id, "update for unknown run ignored");
            return None;
        };

        status.state = update.state;
        if let Some(runners) = update.runners {
            status.runners = runners;
        }
        if let Some(message) = update.message {
            status.message = message;
        }
        if update.state == RunState::Running {
            status.started_at.get_or_insert_with(now);
        }
        if update.state.is_terminal() {
            status.completed_at.get_or_insert_with(now);
        }

        let snapshot = status.clone();
        self.bus.publish(snapshot.clone());

        trace!(run = %run_id, state = %snapshot.state, "run updated");
        Some(snapshot)
    }

    pub fn get(&self, run_id: &RunId) -> Option<RunStatus> {
        self.read().get(run_id).cloned()
    }

    /// Snapshot of every run, oldest first.
    pub fn list(&self) -> Vec<RunStatus> {
        let mut all: Vec<_> = self.read().values().cloned().collect();
        sort(&mut all);
        all
    }

    /// Snapshot of runs currently in `state`, oldest first.
    pub fn list_by_state(&self, state: RunState) -> Vec<RunStatus> {
        let mut all: Vec<_> = self
            .read()
            .values()
            .filter(|s| s.state == state)
            .cloned()
            .collect();
        sort(&mut all);
        all
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Follow a single run. See [`RunSubscription`].
    pub fn subscribe(&self, run_id: &RunId) -> RunSubscription {
        // Receiver and snapshot are taken under one lock so no update falls
        // between them.
        let guard = self.read();
        let rx = self.bus.subscribe();
        let snapshot = guard.get(run_id).cloned();
        drop(guard);

        RunSubscription::for_run(
            rx,
            Arc::clone(&self.runs),
            run_id.clone(),
            snapshot,
            self.config.run_idle(),
        )
    }

    /// Follow every run. See [`RunSubscription`].
    pub fn subscribe_all(&self) -> RunSubscription {
        RunSubscription::for_all(self.bus.subscribe(), self.config.all_idle())
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<RunId, RunStatus>> {
        self.runs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<RunId, RunStatus>> {
        self.runs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RunStatusStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sort(runs: &mut [RunStatus]) {
    runs.sort_by(|a, b| {
        a.scheduled_at
            .cmp(&b.scheduled_at)
            .then_with(|| a.run_id.cmp(&b.run_id))
    });
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use futures::StreamExt;
    use tokio::time::Instant;

    use super::*;

    fn rid(s: &str) -> RunId {
        RunId::from(s)
    }

    #[test]
    fn register_creates_scheduled_record() {
        let store = RunStatusStore::new();
        let status = store.register(rid("run-1"), "CI");

        assert_eq!(status.state, RunState::Scheduled);
        assert_eq!(status.message, "Scheduled");
        assert!(status.runners.is_empty());
        assert!(status.started_at.is_none());
        assert_eq!(store.get(&rid("run-1")), Some(status));
    }

    #[test]
    fn update_unknown_run_is_noop() {
        let store = RunStatusStore::new();
        let mut rx = store.bus().subscribe();

        assert!(store.update(&rid("run-x"), RunUpdate::to(RunState::Running)).is_none());
        assert!(store.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn update_keeps_untouched_fields() {
        let store = RunStatusStore::new();
        store.register(rid("run-1"), "CI");

        let s = store
            .update(&rid("run-1"), RunUpdate::to(RunState::Running).with_message("go"))
            .unwrap();
        assert_eq!(s.message, "go");

        let s = store.update(&rid("run-1"), RunUpdate::to(RunState::Running)).unwrap();
        assert_eq!(s.message, "go");
        assert!(s.runners.is_empty());
    }

    #[test]
    fn timestamps_are_set_once() {
        let store = RunStatusStore::new();
        store.register(rid("run-1"), "CI");

        let first = store.update(&rid("run-1"), RunUpdate::to(RunState::Running)).unwrap();
        let started = first.started_at.expect("started_at set on Running");

        let done = store.update(&rid("run-1"), RunUpdate::to(RunState::Success)).unwrap();
        let completed = done.completed_at.expect("completed_at set on terminal");
        assert!(completed >= started);

        std::thread::sleep(Duration::from_millis(2));
        let again = store.update(&rid("run-1"), RunUpdate::to(RunState::Running)).unwrap();
        assert_eq!(again.started_at, Some(started));

        let again = store.update(&rid("run-1"), RunUpdate::to(RunState::Failure)).unwrap();
        assert_eq!(again.completed_at, Some(completed));
    }

    #[test]
    fn every_update_is_broadcast() {
        let store = RunStatusStore::new();
        let mut rx = store.bus().subscribe();

        store.register(rid("run-1"), "CI");
        store.update(&rid("run-1"), RunUpdate::to(RunState::Scheduled));
        store.update(&rid("run-1"), RunUpdate::to(RunState::Scheduled));

        for _ in 0..3 {
            assert_eq!(rx.try_recv().unwrap().run_id, rid("run-1"));
        }
    }

    #[test]
    fn list_and_filter_by_state() {
        let store = RunStatusStore::new();
        store.register(rid("run-1"), "a");
        store.register(rid("run-2"), "b");
        store.update(&rid("run-2"), RunUpdate::to(RunState::Success));

        assert_eq!(store.list().len(), 2);
        let done = store.list_by_state(RunState::Success);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].run_id, rid("run-2"));
        assert!(store.list_by_state(RunState::Cancelled).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn subscription_to_terminal_run_yields_single_snapshot() {
        let store = RunStatusStore::new();
        store.register(rid("run-1"), "CI");
        store.update(&rid("run-1"), RunUpdate::to(RunState::Success));

        let start = Instant::now();
        let events: Vec<_> = store.subscribe(&rid("run-1")).into_stream().collect().await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].state, RunState::Success);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn subscription_to_unknown_run_times_out_empty() {
        let store = RunStatusStore::new();
        let start = Instant::now();

        let mut sub = store.subscribe(&rid("run-missing"));
        assert!(sub.next().await.is_none());
        assert!(start.elapsed() >= Duration::from_secs(30));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn subscription_follows_run_until_terminal() {
        let store = RunStatusStore::new();
        store.register(rid("run-1"), "CI");
        let mut sub = store.subscribe(&rid("run-1"));

        store.register(rid("run-2"), "other");
        store.update(&rid("run-1"), RunUpdate::to(RunState::Running));
        store.update(&rid("run-2"), RunUpdate::to(RunState::Running));
        store.update(&rid("run-1"), RunUpdate::to(RunState::Failure));
        store.update(&rid("run-1"), RunUpdate::to(RunState::Failure));

        let mut seen = Vec::new();
        while let Some(s) = sub.next().await {
            assert_eq!(s.run_id, rid("run-1"));
            seen.push(s.state);
        }
        assert_eq!(
            seen,
            vec![RunState::Scheduled, RunState::Running, RunState::Failure]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn per_run_window_ignores_other_runs() {
        let store = Arc::new(RunStatusStore::new());
        store.register(rid("run-1"), "CI");
        let mut sub = store.subscribe(&rid("run-1"));
        assert_eq!(sub.next().await.unwrap().state, RunState::Scheduled);

        let noise = {
            let store = store.clone();
            tokio::spawn(async move {
                store.register(rid("run-2"), "noise");
                for _ in 0..10 {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    store.update(&rid("run-2"), RunUpdate::to(RunState::Running));
                }
            })
        };

        let start = Instant::now();
        assert!(sub.next().await.is_none());
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(30) && waited < Duration::from_secs(31));
        noise.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn global_subscription_sees_all_and_ends_when_idle() {
        let store = RunStatusStore::new();
        let mut sub = store.subscribe_all();

        store.register(rid("run-1"), "a");
        store.register(rid("run-2"), "b");
        store.update(&rid("run-1"), RunUpdate::to(RunState::Success));

        assert_eq!(sub.next().await.unwrap().run_id, rid("run-1"));
        assert_eq!(sub.next().await.unwrap().run_id, rid("run-2"));
        let last = sub.next().await.unwrap();
        assert_eq!(last.state, RunState::Success);

        let start = Instant::now();
        assert!(sub.next().await.is_none());
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn custom_idle_windows_apply() {
        let store = RunStatusStore::with_config(
            EventBus::new(16),
            SubscriptionConfig {
                run_idle_ms: 100,
                all_idle_ms: 200,
            },
        );

        let start = Instant::now();
        assert!(store.subscribe(&rid("run-x")).next().await.is_none());
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(start.elapsed() < Duration::from_millis(200));

        let start = Instant::now();
        assert!(store.subscribe_all().next().await.is_none());
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_updates_to_one_run_are_serialized() {
        let store = Arc::new(RunStatusStore::new());
        store.register(rid("run-1"), "CI");
        let mut rx = store.bus().subscribe();

        let mut set = tokio::task::JoinSet::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            set.spawn(async move {
                let running = store
                    .update(
                        &rid("run-1"),
                        RunUpdate::to(RunState::Running).with_message(format!("step {i}")),
                    )
                    .unwrap();
                let done = store
                    .update(&rid("run-1"), RunUpdate::to(RunState::Success))
                    .unwrap();
                (running, done)
            });
        }

        let mut started = Vec::new();
        let mut completed = Vec::new();
        while let Some(joined) = set.join_next().await {
            let (running, done) = joined.unwrap();
            started.push(running.started_at.expect("started_at set on Running"));
            started.push(done.started_at.expect("started_at kept"));
            completed.push(done.completed_at.expect("completed_at set on terminal"));
        }
        assert_eq!(started.len(), 64);
        assert!(started.iter().all(|t| *t == started[0]));
        assert!(completed.iter().all(|t| *t == completed[0]));

        let stored = store.get(&rid("run-1")).unwrap();
        assert_eq!(stored.started_at, Some(started[0]));
        assert_eq!(stored.completed_at, Some(completed[0]));

        let mut events = 0;
        while rx.try_recv().is_ok() {
            events += 1;
        }
        assert_eq!(events, 64);
    }

    #[tokio::test(start_paused = true)]
    async fn lagging_subscription_still_reports_completion() {
        let store = RunStatusStore::with_config(EventBus::new(2), SubscriptionConfig::default());
        store.register(rid("run-1"), "CI");
        let mut sub = store.subscribe(&rid("run-1"));
        assert_eq!(sub.next().await.unwrap().state, RunState::Scheduled);

        store.update(&rid("run-1"), RunUpdate::to(RunState::Success));
        store.register(rid("run-2"), "noise");
        for _ in 0..4 {
            store.update(&rid("run-2"), RunUpdate::to(RunState::Running));
        }

        let start = Instant::now();
        let last = sub.next().await.expect("final status after lag");
        assert_eq!(last.run_id, rid("run-1"));
        assert_eq!(last.state, RunState::Success);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(sub.next().await.is_none());
    }
}
