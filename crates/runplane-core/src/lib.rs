pub mod error;
pub mod extract;
pub mod metrics;
pub mod orchestrator;
pub mod runner;
pub mod state;

pub use error::CoreError;
pub use extract::extract_requirements;
pub use metrics::{MetricsBackend, MetricsHandle, NoOpMetrics, RunOutcome, noop_metrics};
pub use orchestrator::Orchestrator;
pub use runner::{ExecutionBackend, LatencyProfile, RunnerError, RunnerPool, SimulatedExecution};
pub use state::{
    EventBus, RunStatusStore, RunSubscription, RunUpdate, StatusSubscriber, SubscriptionConfig,
};
