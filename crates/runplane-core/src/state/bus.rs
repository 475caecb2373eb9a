use std::sync::Arc;

use runplane_model::RunStatus;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::StatusSubscriber;

/// Multicast channel carrying every run status mutation.
///
/// Bounded: a receiver that falls more than `capacity` events behind loses
/// the oldest ones and continues with newer events. Publishing never waits.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<RunStatus>,
    capacity: usize,
}

impl EventBus {
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Create a bus buffering up to `capacity` events per receiver (min 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Broadcast `status`; returns the number of receivers it reached.
    ///
    /// With no receivers the event is dropped.
    pub fn publish(&self, status: RunStatus) -> usize {
        self.tx.send(status).unwrap_or(0)
    }

    /// Raw receiver observing every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RunStatus> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Feed every broadcast to `subscriber` until `cancel` fires.
    pub fn attach(
        &self,
        subscriber: Arc<dyn StatusSubscriber>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            let name = subscriber.name();
            debug!(subscriber = name, "status subscriber attached");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(status) => subscriber.on_status(&status).await,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(subscriber = name, skipped, "status subscriber lagged; oldest events dropped");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!(subscriber = name, "status subscriber detached");
        })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use runplane_model::{RunId, RunState, now};

    use super::*;

    fn status(id: &str) -> RunStatus {
        RunStatus {
            run_id: RunId::from(id),
            name: "CI".into(),
            state: RunState::Scheduled,
            scheduled_at: now(),
            started_at: None,
            completed_at: None,
            runners: Vec::new(),
            message: "Scheduled".into(),
        }
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<RunId>>);

    #[async_trait]
    impl StatusSubscriber for Collect {
        async fn on_status(&self, status: &RunStatus) {
            self.0.lock().unwrap().push(status.run_id.clone());
        }

        fn name(&self) -> &'static str {
            "collect"
        }
    }

    #[test]
    fn publish_without_receivers_is_dropped() {
        let bus = EventBus::new(4);
        assert_eq!(bus.publish(status("run-1")), 0);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        assert_eq!(EventBus::new(0).capacity(), 1);
    }

    #[tokio::test]
    async fn every_receiver_sees_every_event() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        assert_eq!(bus.publish(status("run-1")), 2);
        bus.publish(status("run-2"));

        for rx in [&mut a, &mut b] {
            assert_eq!(rx.recv().await.unwrap().run_id.as_str(), "run-1");
            assert_eq!(rx.recv().await.unwrap().run_id.as_str(), "run-2");
        }
    }

    #[tokio::test]
    async fn slow_receiver_loses_oldest() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..5 {
            bus.publish(status(&format!("run-{i}")));
        }

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(3))));
        assert_eq!(rx.recv().await.unwrap().run_id.as_str(), "run-3");
        assert_eq!(rx.recv().await.unwrap().run_id.as_str(), "run-4");
    }

    #[tokio::test]
    async fn attached_subscriber_receives_until_cancelled() {
        let bus = EventBus::new(8);
        let sink = Arc::new(Collect::default());
        let cancel = CancellationToken::new();
        let handle = bus.attach(sink.clone(), cancel.clone());

        bus.publish(status("run-1"));
        bus.publish(status("run-2"));
        while sink.0.lock().unwrap().len() < 2 {
            tokio::task::yield_now().await;
        }

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(sink.0.lock().unwrap().len(), 2);
    }
}
