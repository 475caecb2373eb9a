use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Label, ModelError, RunId, RunnerId, Timestamp, now};

/// Lifecycle state of a runner.
///
/// Happy path: `Pending → Allocated → Connected → Running → Completed`.
/// `Failed` ends any non-terminal state on error; `Released` is reachable
/// from every state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunnerState {
    Pending,
    Allocated,
    Connected,
    Running,
    Completed,
    Failed,
    Released,
}

impl RunnerState {
    /// `Completed`, `Failed` and `Released` admit no further lifecycle step.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunnerState::Completed | RunnerState::Failed | RunnerState::Released
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerState::Pending => "PENDING",
            RunnerState::Allocated => "ALLOCATED",
            RunnerState::Connected => "CONNECTED",
            RunnerState::Running => "RUNNING",
            RunnerState::Completed => "COMPLETED",
            RunnerState::Failed => "FAILED",
            RunnerState::Released => "RELEASED",
        }
    }
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunnerState {
    type Err = ModelError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(RunnerState::Pending),
            "allocated" => Ok(RunnerState::Allocated),
            "connected" => Ok(RunnerState::Connected),
            "running" => Ok(RunnerState::Running),
            "completed" => Ok(RunnerState::Completed),
            "failed" => Ok(RunnerState::Failed),
            "released" => Ok(RunnerState::Released),
            _ => Err(ModelError::UnknownRunnerState(s.to_string())),
        }
    }
}

/// Snapshot of a single runner.
///
/// The pool owns the live record; everything handed out is a copy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerRecord {
    pub runner_id: RunnerId,
    /// Label the runner was allocated for.
    pub label: Label,
    /// Run that requested the runner.
    pub run_id: RunId,
    pub state: RunnerState,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub allocated_at: Option<Timestamp>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub connected_at: Option<Timestamp>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<Timestamp>,
    /// Failure reason, set only in `Failed` state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunnerRecord {
    /// Fresh record in `Allocated` state stamped with the current time.
    pub fn allocated(runner_id: RunnerId, label: impl Into<Label>, run_id: RunId) -> Self {
        Self {
            runner_id,
            label: label.into(),
            run_id,
            state: RunnerState::Allocated,
            allocated_at: Some(now()),
            connected_at: None,
            completed_at: None,
            error: None,
        }
    }

    /// Move to `Failed`, keeping the first completion timestamp.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.state = RunnerState::Failed;
        self.error = Some(reason.into());
        self.completed_at.get_or_insert_with(now);
    }

    /// Returns `true` if the runner finished its job successfully.
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.state == RunnerState::Completed
    }
}
