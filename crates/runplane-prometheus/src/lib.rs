//! Prometheus backend for run pipeline metrics.
//!
//! [`PrometheusMetrics`] implements [`runplane_core::MetricsBackend`]; hand a
//! clone to the orchestrator and serve [`PrometheusMetrics::encode`] from the
//! scrape endpoint.
//!
//! ```rust
//! use std::sync::Arc;
//! use runplane_core::{Orchestrator, RunStatusStore, RunnerPool};
//! use runplane_prometheus::PrometheusMetrics;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = PrometheusMetrics::new()?;
//! let orchestrator = Orchestrator::new(
//!     Arc::new(RunnerPool::default()),
//!     Arc::new(RunStatusStore::new()),
//!     Arc::new(metrics.clone()),
//! );
//! # drop(orchestrator);
//!
//! let body = metrics.encode()?;
//! assert!(body.contains("runplane_runs_started_total"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//! - `runplane_runs_started_total` - Counter
//! - `runplane_runs_completed_total{outcome}` - Counter
//! - `runplane_run_duration_seconds{outcome}` - Histogram
//! - `runplane_runner_errors_total{stage, error_kind}` - Counter

mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TEXT_FORMAT, TextEncoder};
