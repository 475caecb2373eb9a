use std::sync::Arc;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
    proto::MetricFamily,
};

use runplane_core::{MetricsBackend, RunOutcome};

const NAMESPACE: &str = "runplane";

/// Prometheus implementation of [`MetricsBackend`].
///
/// All labels are low cardinality:
/// - `outcome`: "success", "failure", "cancelled"
/// - `stage`: "allocate", "connect", "execute"
/// - `error_kind`: "not_found", "invalid_transition", "upstream", "join"
#[derive(Clone)]
pub struct PrometheusMetrics {
    runs_started: IntCounter,
    runs_completed: IntCounterVec,
    run_duration: HistogramVec,
    runner_errors: IntCounterVec,
    registry: Arc<Registry>,
}

impl PrometheusMetrics {
    /// Register the run metrics in `registry`.
    pub fn new_with_registry(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let runs_started = IntCounter::with_opts(
            Opts::new("runs_started_total", "Runs accepted by the orchestrator").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(runs_started.clone()))?;

        let runs_completed = IntCounterVec::new(
            Opts::new("runs_completed_total", "Runs that reached a terminal state")
                .namespace(NAMESPACE),
            &["outcome"],
        )?;
        registry.register(Box::new(runs_completed.clone()))?;

        let run_duration = HistogramVec::new(
            HistogramOpts::new(
                "run_duration_seconds",
                "Time from scheduling to terminal state",
            )
            .namespace(NAMESPACE)
            .buckets(vec![0.01, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
            &["outcome"],
        )?;
        registry.register(Box::new(run_duration.clone()))?;

        let runner_errors = IntCounterVec::new(
            Opts::new("runner_errors_total", "Runner lifecycle errors").namespace(NAMESPACE),
            &["stage", "error_kind"],
        )?;
        registry.register(Box::new(runner_errors.clone()))?;

        Ok(Self {
            runs_started,
            runs_completed,
            run_duration,
            runner_errors,
            registry,
        })
    }

    /// Backend with a private registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::new_with_registry(Arc::new(Registry::new()))
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Text exposition of every registered metric.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Registry for metrics registered alongside the run metrics.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn record_run_started(&self) {
        self.runs_started.inc();
    }

    fn record_run_completed(&self, outcome: RunOutcome, duration_ms: u64) {
        let outcome = outcome.as_label();
        self.runs_completed.with_label_values(&[outcome]).inc();
        self.run_duration
            .with_label_values(&[outcome])
            .observe(duration_ms as f64 / 1000.0);
    }

    fn record_runner_error(&self, stage: &str, error_kind: &str) {
        self.runner_errors
            .with_label_values(&[stage, error_kind])
            .inc();
    }
}
