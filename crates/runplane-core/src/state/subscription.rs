use std::{sync::PoisonError, time::Duration};

use futures::Stream;
use runplane_model::{RunId, RunStatus};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    time::{Instant, timeout_at},
};
use tracing::{debug, warn};

use super::store::RunMap;

/// Inactivity windows after which subscriptions end on their own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubscriptionConfig {
    /// Per-run window, restarted by every matching event.
    pub run_idle_ms: u64,
    /// Global window, restarted by any event.
    pub all_idle_ms: u64,
}

impl SubscriptionConfig {
    pub fn run_idle(&self) -> Duration {
        Duration::from_millis(self.run_idle_ms)
    }

    pub fn all_idle(&self) -> Duration {
        Duration::from_millis(self.all_idle_ms)
    }
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            run_idle_ms: 30_000,
            all_idle_ms: 60_000,
        }
    }
}

#[derive(Debug)]
enum Filter {
    Run(RunId),
    All,
}

/// Live, self-terminating sequence of run status updates.
///
/// A per-run subscription yields the snapshot taken at subscribe time (if the
/// run exists), then every matching broadcast, and ends after the first
/// terminal status or once its idle window passes without a matching event.
/// If it lags behind the bus it re-reads the run from the store, so a dropped
/// terminal event still ends it with the final status.
/// A global subscription yields everything and ends only on inactivity.
#[derive(Debug)]
pub struct RunSubscription {
    rx: broadcast::Receiver<RunStatus>,
    filter: Filter,
    runs: Option<RunMap>,
    idle: Duration,
    deadline: Instant,
    snapshot: Option<RunStatus>,
    done: bool,
}

impl RunSubscription {
    pub(crate) fn for_run(
        rx: broadcast::Receiver<RunStatus>,
        runs: RunMap,
        run_id: RunId,
        snapshot: Option<RunStatus>,
        idle: Duration,
    ) -> Self {
        Self {
            rx,
            filter: Filter::Run(run_id),
            runs: Some(runs),
            idle,
            deadline: Instant::now() + idle,
            snapshot,
            done: false,
        }
    }

    pub(crate) fn for_all(rx: broadcast::Receiver<RunStatus>, idle: Duration) -> Self {
        Self {
            rx,
            filter: Filter::All,
            runs: None,
            idle,
            deadline: Instant::now() + idle,
            snapshot: None,
            done: false,
        }
    }

    /// Next status, or `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<RunStatus> {
        if self.done {
            return None;
        }
        if let Some(snapshot) = self.snapshot.take() {
            self.done = snapshot.is_terminal();
            return Some(snapshot);
        }

        loop {
            let msg = match timeout_at(self.deadline, self.rx.recv()).await {
                Ok(msg) => msg,
                Err(_) => {
                    debug!(filter = ?self.filter, "subscription idle, closing");
                    self.done = true;
                    return None;
                }
            };

            match msg {
                Ok(status) => {
                    let per_run = match &self.filter {
                        Filter::Run(id) if *id != status.run_id => continue,
                        Filter::Run(_) => true,
                        Filter::All => false,
                    };
                    self.deadline = Instant::now() + self.idle;
                    self.done = per_run && status.is_terminal();
                    return Some(status);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(filter = ?self.filter, skipped, "subscription lagged; oldest events dropped");
                    if let Some(last) = self.terminal_in_store() {
                        self.done = true;
                        return Some(last);
                    }
                }
                Err(RecvError::Closed) => {
                    self.done = true;
                    return None;
                }
            }
        }
    }

    fn terminal_in_store(&self) -> Option<RunStatus> {
        let (Filter::Run(run_id), Some(runs)) = (&self.filter, &self.runs) else {
            return None;
        };
        runs.read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(run_id)
            .filter(|s| s.is_terminal())
            .cloned()
    }

    /// Adapt into a [`Stream`] for transports.
    pub fn into_stream(self) -> impl Stream<Item = RunStatus> + Send + 'static {
        futures::stream::unfold(self, |mut sub| async move {
            let status = sub.next().await?;
            Some((status, sub))
        })
    }
}
