use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{ModelError, RunId, RunnerRecord, Timestamp};

/// Lifecycle state of a run.
///
/// `Scheduled → Running → Success | Failure`, plus `Cancelled` from any state.
/// A run without runner requirements goes straight `Scheduled → Success`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Scheduled,
    Running,
    Success,
    Failure,
    Cancelled,
}

impl RunState {
    /// `Success`, `Failure` and `Cancelled` are terminal.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Success | RunState::Failure | RunState::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Scheduled => "SCHEDULED",
            RunState::Running => "RUNNING",
            RunState::Success => "SUCCESS",
            RunState::Failure => "FAILURE",
            RunState::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunState {
    type Err = ModelError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Ok(RunState::Scheduled),
            "running" => Ok(RunState::Running),
            "success" => Ok(RunState::Success),
            "failure" => Ok(RunState::Failure),
            "cancelled" | "canceled" => Ok(RunState::Cancelled),
            _ => Err(ModelError::UnknownRunState(s.to_string())),
        }
    }
}

/// Point-in-time status of a run as kept by the status store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    pub run_id: RunId,
    /// Workflow name.
    pub name: String,
    pub state: RunState,
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_at: Timestamp,
    /// Set once, the first time the run enters `Running`.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub started_at: Option<Timestamp>,
    /// Set once, the first time the run enters a terminal state.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<Timestamp>,
    /// Runner snapshots as of the last update that carried them.
    #[serde(default)]
    pub runners: Vec<RunnerRecord>,
    pub message: String,
}

impl RunStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Outcome of a scheduling request as seen by its caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub run_id: RunId,
    pub state: RunState,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: Timestamp,
    /// `None` while the run is still in flight.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end_time: Option<Timestamp>,
    #[serde(default)]
    pub runners: Vec<RunnerRecord>,
    #[serde(default)]
    pub message: String,
}
