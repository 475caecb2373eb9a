use serde::{Deserialize, Serialize};

use crate::Label;

/// One runner that a workflow needs: the job it serves, the label it must
/// carry and how many steps the job declares.
///
/// Derived from a [`crate::WorkflowSpec`]; never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerRequirement {
    pub job_name: String,
    pub required_label: Label,
    pub step_count: usize,
}

impl RunnerRequirement {
    pub fn new(job_name: impl Into<String>, required_label: impl Into<Label>, step_count: usize) -> Self {
        Self {
            job_name: job_name.into(),
            required_label: required_label.into(),
            step_count,
        }
    }
}
