use std::{convert::Infallible, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::debug;

use runplane_model::{RunId, RunState, RunStatus, RunnerId, WorkflowSpec};

use crate::{error::ApiError, handler::ApiHandler};

/// SSE event name carrying a serialized [`RunStatus`].
pub const RUN_STATUS_EVENT: &str = "run-status";

/// HTTP API service builder.
pub struct HttpApi<H> {
    handler: Arc<H>,
}

impl<H> HttpApi<H>
where
    H: ApiHandler,
{
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }

    /// Router with every endpoint mounted.
    ///
    /// Runs:
    /// - POST /api/v1/runs - submit workflow (202)
    /// - GET /api/v1/runs[?state=] - list runs
    /// - GET /api/v1/runs/stream - SSE, every run
    /// - GET /api/v1/runs/{id} - run status
    /// - POST /api/v1/runs/{id}/cancel - cancel run (202)
    /// - GET /api/v1/runs/{id}/stream - SSE, one run
    ///
    /// Runners:
    /// - POST /api/v1/runners/allocate - allocate (201)
    /// - GET /api/v1/runners - list
    /// - GET /api/v1/runners/{id} - runner record
    /// - DELETE /api/v1/runners/{id} - release (204)
    pub fn router(self) -> Router {
        Router::new()
            .route("/api/v1/runs", post(submit_run::<H>).get(list_runs::<H>))
            .route("/api/v1/runs/stream", get(stream_all::<H>))
            .route("/api/v1/runs/{id}", get(get_run::<H>))
            .route("/api/v1/runs/{id}/cancel", post(cancel_run::<H>))
            .route("/api/v1/runs/{id}/stream", get(stream_run::<H>))
            .route("/api/v1/runners", get(list_runners::<H>))
            .route("/api/v1/runners/allocate", post(allocate_runner::<H>))
            .route(
                "/api/v1/runners/{id}",
                get(get_runner::<H>).delete(release_runner::<H>),
            )
            .with_state(self.handler)
    }
}

#[derive(Debug, Deserialize)]
struct ListRunsQuery {
    state: Option<String>,
}

/// Body of `POST /api/v1/runners/allocate`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocateRunnerRequest {
    #[serde(alias = "runs-on", alias = "label")]
    pub runs_on: String,
    /// Run to attribute the runner to; a fresh id when absent.
    #[serde(default)]
    pub run_id: Option<RunId>,
}

/// POST /api/v1/runs
async fn submit_run<H>(
    State(handler): State<Arc<H>>,
    body: Result<Json<WorkflowSpec>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let Json(workflow) = body?;
    let result = handler.submit_run(workflow).await?;
    Ok((StatusCode::ACCEPTED, Json(result)))
}

/// GET /api/v1/runs[?state=running]
async fn list_runs<H>(
    State(handler): State<Arc<H>>,
    Query(query): Query<ListRunsQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let state = query.state.as_deref().map(parse_state).transpose()?;
    Ok(Json(handler.list_runs(state).await?))
}

/// GET /api/v1/runs/{id}
async fn get_run<H>(
    State(handler): State<Arc<H>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let run_id = RunId::from(id);
    match handler.get_run(&run_id).await? {
        Some(status) => Ok(Json(status)),
        None => Err(ApiError::NotFound(format!("run {run_id}"))),
    }
}

/// POST /api/v1/runs/{id}/cancel
async fn cancel_run<H>(
    State(handler): State<Arc<H>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    if id.trim().is_empty() {
        return Err(ApiError::InvalidRequest("run id cannot be empty".into()));
    }
    handler.cancel_run(&RunId::from(id)).await?;
    Ok(StatusCode::ACCEPTED)
}

/// GET /api/v1/runs/{id}/stream
async fn stream_run<H>(
    State(handler): State<Arc<H>>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    H: ApiHandler,
{
    debug!(run = %id, "run stream opened");
    let sub = handler.subscribe_run(&RunId::from(id)).await;
    Sse::new(sub.into_stream().map(to_event)).keep_alive(KeepAlive::default())
}

/// GET /api/v1/runs/stream
async fn stream_all<H>(State(handler): State<Arc<H>>) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    H: ApiHandler,
{
    debug!("global run stream opened");
    let sub = handler.subscribe_all().await;
    Sse::new(sub.into_stream().map(to_event)).keep_alive(KeepAlive::default())
}

/// POST /api/v1/runners/allocate
async fn allocate_runner<H>(
    State(handler): State<Arc<H>>,
    body: Result<Json<AllocateRunnerRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let Json(req) = body?;
    if req.runs_on.trim().is_empty() {
        return Err(ApiError::InvalidRequest("runsOn cannot be empty".into()));
    }
    let record = handler.allocate_runner(&req.runs_on, req.run_id).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/v1/runners
async fn list_runners<H>(State(handler): State<Arc<H>>) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    Ok(Json(handler.list_runners().await?))
}

/// GET /api/v1/runners/{id}
async fn get_runner<H>(
    State(handler): State<Arc<H>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let runner_id = RunnerId::from(id);
    match handler.get_runner(&runner_id).await? {
        Some(record) => Ok(Json(record)),
        None => Err(ApiError::NotFound(format!("runner {runner_id}"))),
    }
}

/// DELETE /api/v1/runners/{id}
async fn release_runner<H>(
    State(handler): State<Arc<H>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    handler.release_runner(&RunnerId::from(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn to_event(status: RunStatus) -> Result<Event, Infallible> {
    let event = Event::default()
        .event(RUN_STATUS_EVENT)
        .json_data(&status)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()));
    Ok(event)
}

fn parse_state(s: &str) -> Result<RunState, ApiError> {
    s.parse().map_err(|_| {
        ApiError::InvalidRequest(format!(
            "invalid state: '{s}' (valid: scheduled, running, success, failure, cancelled)"
        ))
    })
}
