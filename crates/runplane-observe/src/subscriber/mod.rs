#![cfg(feature = "subscriber")]

//! Run status logging.
//!
//! [`StatusLogger`] turns every broadcast run status into one structured
//! tracing event. Attach it with [`runplane_core::EventBus::attach`].

use async_trait::async_trait;
use runplane_core::StatusSubscriber;
use runplane_model::{RunState, RunStatus, RunnerState};
use tracing::{debug, info, warn};

/// Subscriber logging run status transitions.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatusLogger;

#[async_trait]
impl StatusSubscriber for StatusLogger {
    async fn on_status(&self, status: &RunStatus) {
        log_status(status);
    }

    fn name(&self) -> &'static str {
        "status-logger"
    }
}

fn log_status(s: &RunStatus) {
    let runners = s.runners.len();
    let failed = s
        .runners
        .iter()
        .filter(|r| r.state == RunnerState::Failed)
        .count();

    match s.state {
        RunState::Scheduled => debug!(run = %s.run_id, name = %s.name, "{}", s.message),
        RunState::Running => {
            debug!(run = %s.run_id, name = %s.name, runners, "{}", s.message)
        }
        RunState::Success => {
            info!(run = %s.run_id, name = %s.name, runners, "{}", s.message)
        }
        RunState::Failure => {
            warn!(run = %s.run_id, name = %s.name, runners, failed, "{}", s.message)
        }
        RunState::Cancelled => {
            info!(run = %s.run_id, name = %s.name, runners, "{}", s.message)
        }
    }
}
