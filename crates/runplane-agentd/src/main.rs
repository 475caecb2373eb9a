mod config;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use runplane_api::{HttpApi, OrchestratorAdapter};
use runplane_core::{EventBus, Orchestrator, RunStatusStore, RunnerPool};
use runplane_observe::{StatusLogger, init_local_offset, init_logger};
use runplane_prometheus::{PrometheusMetrics, TEXT_FORMAT};

use crate::config::AgentConfig;

fn main() -> anyhow::Result<()> {
    // Local offset must be read before the runtime spawns threads.
    init_local_offset();

    let cfg = AgentConfig::from_env()?;
    init_logger(&cfg.logger)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cfg))
}

async fn run(cfg: AgentConfig) -> anyhow::Result<()> {
    let metrics = PrometheusMetrics::new()?;

    let pool = Arc::new(RunnerPool::new(cfg.latency));
    let store = Arc::new(RunStatusStore::with_config(
        EventBus::new(cfg.bus_capacity),
        cfg.subscription,
    ));
    let orchestrator = Orchestrator::new(pool, Arc::clone(&store), Arc::new(metrics.clone()));

    let stop = CancellationToken::new();
    let status_logger = store.bus().attach(Arc::new(StatusLogger), stop.clone());

    let app = HttpApi::new(Arc::new(OrchestratorAdapter::new(orchestrator.clone())))
        .router()
        .merge(
            Router::new()
                .route("/metrics", get(serve_metrics))
                .with_state(metrics),
        );

    let listener = TcpListener::bind(cfg.listen)
        .await
        .with_context(|| format!("binding {}", cfg.listen))?;
    info!(addr = %listener.local_addr()?, "runplane agent listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    orchestrator.shutdown().await;
    stop.cancel();
    if let Err(e) = status_logger.await {
        error!(error = %e, "status logger task failed");
    }
    info!("runplane agent stopped");
    Ok(())
}

async fn serve_metrics(State(metrics): State<PrometheusMetrics>) -> Response {
    match metrics.encode() {
        Ok(body) => ([(CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        return;
    }
    info!("shutdown requested");
}
