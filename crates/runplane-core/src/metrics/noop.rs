use crate::metrics::backend::{MetricsBackend, RunOutcome};

/// No-op metrics backend that compiles to nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetrics;

impl MetricsBackend for NoOpMetrics {
    #[inline(always)]
    fn record_run_started(&self) {}

    #[inline(always)]
    fn record_run_completed(&self, _: RunOutcome, _: u64) {}

    #[inline(always)]
    fn record_runner_error(&self, _: &str, _: &str) {}
}
