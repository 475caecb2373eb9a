use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{Label, ModelError, ModelResult};

/// Declarative multi-job workflow submitted for execution.
///
/// JSON follows the CI workflow dialect:
///
/// ```json
/// {
///   "name": "CI",
///   "jobs": {
///     "build": { "runs-on": "ubuntu-latest", "steps": [{ "name": "checkout" }] },
///     "lint":  { "steps": [{ "run": "cargo clippy" }] }
///   }
/// }
/// ```
///
/// A job that does not parse as a [`JobSpec`] is kept as [`JobEntry::Malformed`]
/// instead of rejecting the whole workflow.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    /// Human-readable workflow name, copied into the run status.
    #[serde(default)]
    pub name: String,
    /// Jobs keyed by job name.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub jobs: BTreeMap<String, JobEntry>,
    /// Free-form trigger context. Carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl WorkflowSpec {
    /// Create a workflow without jobs.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder-style helper adding (or replacing) a well-formed job.
    pub fn with_job(mut self, name: impl Into<String>, job: JobSpec) -> Self {
        self.jobs.insert(name.into(), JobEntry::Job(job));
        self
    }

    /// Check request-level constraints.
    ///
    /// Individual jobs are never validated here: malformed jobs are skipped
    /// when requirements are extracted.
    pub fn validate(&self) -> ModelResult<()> {
        if self.name.trim().is_empty() {
            return Err(ModelError::Invalid("workflow name cannot be empty".into()));
        }
        Ok(())
    }
}

/// A job as it appeared in the submitted workflow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobEntry {
    /// Job with the expected shape.
    Job(JobSpec),
    /// Anything else (wrong field types, `null`, scalars...).
    Malformed(serde_json::Value),
}

impl JobEntry {
    /// Returns the parsed job, or `None` for malformed entries.
    pub fn as_job(&self) -> Option<&JobSpec> {
        match self {
            JobEntry::Job(job) => Some(job),
            JobEntry::Malformed(_) => None,
        }
    }
}

/// Single job of a workflow.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Runner label the job must execute on. Jobs without one need no runner.
    #[serde(
        rename = "runs-on",
        alias = "requiredLabel",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub runs_on: Option<Label>,
    /// Ordered steps. Absent and empty are equivalent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<StepSpec>>,
}

impl JobSpec {
    /// Job that requires a runner with the given label.
    pub fn on(label: impl Into<Label>) -> Self {
        Self {
            runs_on: Some(label.into()),
            steps: None,
        }
    }

    /// Replace the step list.
    pub fn with_steps(mut self, steps: Vec<StepSpec>) -> Self {
        self.steps = Some(steps);
        self
    }

    /// Number of declared steps (`0` when absent).
    pub fn step_count(&self) -> usize {
        self.steps.as_ref().map_or(0, Vec::len)
    }
}

/// Single step of a job. Steps are carried, never executed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses: Option<String>,
    #[serde(
        rename = "with",
        alias = "parameters",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub parameters: BTreeMap<String, String>,
    #[serde(
        rename = "run",
        alias = "command",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub command: Option<String>,
}

impl StepSpec {
    /// Step with only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }
}

fn null_as_empty<'de, D>(de: D) -> Result<BTreeMap<String, JobEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, JobEntry>>::deserialize(de)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ci_dialect() {
        let json = r#"{
            "name": "CI",
            "jobs": {
                "build": {
                    "runs-on": "ubuntu-latest",
                    "steps": [
                        { "name": "checkout", "uses": "actions/checkout@v4" },
                        { "name": "test", "run": "cargo test", "with": { "toolchain": "stable" } }
                    ]
                }
            }
        }"#;

        let wf: WorkflowSpec = serde_json::from_str(json).unwrap();
        assert_eq!(wf.name, "CI");

        let build = wf.jobs["build"].as_job().expect("build must parse");
        assert_eq!(build.runs_on.as_deref(), Some("ubuntu-latest"));
        assert_eq!(build.step_count(), 2);

        let steps = build.steps.as_ref().unwrap();
        assert_eq!(steps[1].command.as_deref(), Some("cargo test"));
        assert_eq!(steps[1].parameters["toolchain"], "stable");
    }

    #[test]
    fn accepts_long_field_aliases() {
        let json = r#"{
            "name": "CI",
            "jobs": {
                "build": {
                    "requiredLabel": "ubuntu-latest",
                    "steps": [{ "name": "s1", "command": "make", "parameters": { "k": "v" } }]
                }
            }
        }"#;

        let wf: WorkflowSpec = serde_json::from_str(json).unwrap();
        let build = wf.jobs["build"].as_job().unwrap();
        assert_eq!(build.runs_on.as_deref(), Some("ubuntu-latest"));

        let step = &build.steps.as_ref().unwrap()[0];
        assert_eq!(step.command.as_deref(), Some("make"));
        assert_eq!(step.parameters["k"], "v");
    }

    #[test]
    fn malformed_job_does_not_reject_workflow() {
        let json = r#"{
            "name": "CI",
            "jobs": {
                "good": { "runs-on": "ubuntu-latest" },
                "bad-type": { "runs-on": 42 },
                "null-job": null,
                "scalar": "oops"
            }
        }"#;

        let wf: WorkflowSpec = serde_json::from_str(json).unwrap();
        assert_eq!(wf.jobs.len(), 4);
        assert!(wf.jobs["good"].as_job().is_some());
        assert!(wf.jobs["bad-type"].as_job().is_none());
        assert!(wf.jobs["null-job"].as_job().is_none());
        assert!(wf.jobs["scalar"].as_job().is_none());
    }

    #[test]
    fn missing_or_null_jobs_mean_empty() {
        let wf: WorkflowSpec = serde_json::from_str(r#"{ "name": "Empty" }"#).unwrap();
        assert!(wf.jobs.is_empty());

        let wf: WorkflowSpec = serde_json::from_str(r#"{ "name": "Empty", "jobs": null }"#).unwrap();
        assert!(wf.jobs.is_empty());
    }

    #[test]
    fn step_count_treats_absent_as_zero() {
        assert_eq!(JobSpec::on("x").step_count(), 0);
        assert_eq!(JobSpec::on("x").with_steps(vec![]).step_count(), 0);
        assert_eq!(
            JobSpec::on("x")
                .with_steps(vec![StepSpec::named("a"), StepSpec::named("b")])
                .step_count(),
            2
        );
    }

    #[test]
    fn validate_rejects_blank_name() {
        assert!(WorkflowSpec::new("CI").validate().is_ok());
        assert!(matches!(
            WorkflowSpec::new("   ").validate(),
            Err(ModelError::Invalid(_))
        ));
    }
}
