//! Requirement extraction: which runners does a workflow need?
use runplane_model::{RunnerRequirement, WorkflowSpec};
use tracing::trace;

/// Derive one [`RunnerRequirement`] per job that declares a runner label.
///
/// Jobs without a label and malformed job entries are skipped. Output order
/// follows the workflow's job map and carries no meaning for scheduling.
pub fn extract_requirements(workflow: &WorkflowSpec) -> Vec<RunnerRequirement> {
    workflow
        .jobs
        .iter()
        .filter_map(|(name, entry)| {
            let Some(job) = entry.as_job() else {
                trace!(job = %name, "skipping malformed job");
                return None;
            };
            let label = job.runs_on.as_ref()?;
            Some(RunnerRequirement::new(name.clone(), label.clone(), job.step_count()))
        })
        .collect()
}
