//! HTTP surface of the run orchestrator.
//!
//! [`HttpApi`] mounts the REST and SSE routes over any [`ApiHandler`];
//! [`OrchestratorAdapter`] is the handler backed by a live
//! [`runplane_core::Orchestrator`].
mod adapter;
pub use adapter::OrchestratorAdapter;

mod error;
pub use error::ApiError;

mod handler;
pub use handler::ApiHandler;

mod http;
pub use http::{AllocateRunnerRequest, HttpApi, RUN_STATUS_EVENT};
