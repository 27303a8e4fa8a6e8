//! Plain-text result summary written to the `--output` file.

use std::fmt;

use crate::target::Target;
use crate::test_type::TestType;

/// Identifies the submission a report describes.
#[derive(Debug, Clone)]
pub struct SubmissionContext {
    pub job_id: String,
    pub project: String,
    pub region: String,
    pub test_type: TestType,
    pub target: Target,
}

/// What happened to the submission.
#[derive(Debug, Clone)]
pub enum SubmissionOutcome {
    /// The Batch service accepted the job.
    Submitted {
        /// Fully-qualified resource name returned by the service.
        name: String,
        uid: String,
    },
    /// The create call failed.
    Failed {
        /// Short error kind, e.g. `ApiError`.
        kind: String,
        message: String,
        /// Source errors, outermost first.
        chain: Vec<String>,
    },
    /// Nothing was sent; `job_json` is the request body that would have been.
    DryRun { job_json: String },
}

#[derive(Debug, Clone)]
pub struct SubmissionReport {
    pub context: SubmissionContext,
    pub outcome: SubmissionOutcome,
}

impl SubmissionReport {
    pub fn new(context: SubmissionContext, outcome: SubmissionOutcome) -> Self {
        Self { context, outcome }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self.outcome, SubmissionOutcome::Failed { .. })
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SubmissionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ctx = &self.context;
        match &self.outcome {
            SubmissionOutcome::Submitted { name, uid } => writeln!(
                f,
                "Job submitted successfully using the Batch REST API.\n\
                 Job name: {}\n\
                 Job response name: {name}\n\
                 Job UID: {uid}\n\
                 Project: {}\n\
                 Region: {}\n\
                 {}: {}",
                ctx.job_id,
                ctx.project,
                ctx.region,
                ctx.test_type.target_label(),
                ctx.target,
            ),
            SubmissionOutcome::Failed {
                kind,
                message,
                chain,
            } => {
                writeln!(
                    f,
                    "Error submitting job: {kind}: {message}\n\
                     Error details: {message}\n\
                     Job name: {}\n\
                     Project: {}\n\
                     Region: {}\n\
                     Error chain:",
                    ctx.job_id, ctx.project, ctx.region,
                )?;
                chain
                    .iter()
                    .try_for_each(|cause| writeln!(f, "  {cause}"))
            }
            SubmissionOutcome::DryRun { job_json } => writeln!(
                f,
                "Dry run: job not submitted.\n\
                 Job name: {}\n\
                 Project: {}\n\
                 Region: {}\n\
                 {}: {}\n\
                 Job specification:\n\
                 {job_json}",
                ctx.job_id,
                ctx.project,
                ctx.region,
                ctx.test_type.target_label(),
                ctx.target,
            ),
        }
    }
}
