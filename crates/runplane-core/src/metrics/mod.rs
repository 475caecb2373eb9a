//! Metrics collection abstraction for run pipelines.
//!
//! Backends (prometheus, statsd, etc) implement [`MetricsBackend`] and are
//! injected into the [`crate::Orchestrator`].
mod backend;
pub use backend::{MetricsBackend, MetricsHandle, RunOutcome};

mod noop;
pub use noop::NoOpMetrics;

use std::sync::Arc;

/// Create a no-op metrics handle.
#[inline]
pub fn noop_metrics() -> MetricsHandle {
    Arc::new(NoOpMetrics)
}
