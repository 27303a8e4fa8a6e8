//! End-to-end probe run: resolve, build the job, submit, write the report.

use std::collections::BTreeMap;
use std::path::Path;

use netprobe_cloud::auth::{AuthError, TokenProvider};
use netprobe_cloud::batch::{BatchApiError, BatchClient, JobSubmitter};
use netprobe_cloud::credentials::{CredentialsError, ServiceAccountKey};
use netprobe_cloud::job::{self, Job, JobTemplate};
use netprobe_core::error::CoreError;
use netprobe_core::job_id;
use netprobe_core::report::{SubmissionContext, SubmissionOutcome, SubmissionReport};
use netprobe_core::script::DiagnosticScript;
use netprobe_core::target::Target;
use netprobe_core::test_type::TestType;

use crate::cli::Cli;
use crate::resolve::{self, DiscoverySources, ResolveError};

/// Entrypoint of the direct netcat probe.
const NETCAT_ENTRYPOINT: &str = "/usr/bin/nc";
/// Interpreter for rendered diagnostic scripts.
const SCRIPT_ENTRYPOINT: &str = "/bin/bash";

/// Failures that stop the run before a report can be written.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Credentials(#[from] CredentialsError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("failed to serialize job specification: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write output file {path}: {source}")]
    WriteOutput {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Everything needed to build and submit one probe job.
#[derive(Debug, Clone)]
pub struct ProbePlan {
    pub project: String,
    pub region: String,
    pub test_type: TestType,
    pub target: Target,
    pub image: String,
    pub network: String,
    pub subnet: String,
    pub max_run_duration_secs: u64,
}

impl ProbePlan {
    pub fn from_cli(cli: &Cli, project: String, target: Target) -> Self {
        Self {
            project,
            region: cli.region.clone(),
            test_type: cli.test_type,
            target,
            image: cli.image.clone(),
            network: cli.network.clone(),
            subnet: cli.subnet.clone(),
            max_run_duration_secs: cli.max_run_duration_secs,
        }
    }

    pub fn parent(&self) -> String {
        job::parent(&self.project, &self.region)
    }

    /// Build the Batch job for this plan.
    ///
    /// Netcat probes run `nc -z -v host port` directly; every other test
    /// type runs the rendered diagnostic script under bash.
    pub fn build_job(&self) -> Job {
        let (entrypoint, commands) = match self.test_type {
            TestType::Netcat => (
                NETCAT_ENTRYPOINT,
                vec![
                    "-z".to_string(),
                    "-v".to_string(),
                    self.target.host().to_string(),
                    self.target.port().to_string(),
                ],
            ),
            _ => {
                let script = DiagnosticScript::new(self.test_type, self.target.clone()).render();
                (SCRIPT_ENTRYPOINT, vec!["-c".to_string(), script])
            }
        };

        let mut template = JobTemplate::new(&self.image, entrypoint, commands, &self.region);
        template.network = self.network.clone();
        template.subnet = self.subnet.clone();
        template.max_run_duration_secs = self.max_run_duration_secs;
        if self.test_type.needs_privileged_container() {
            template.container_options = Some("--privileged".to_string());
        }
        template.labels = BTreeMap::from([
            ("app".to_string(), "netprobe".to_string()),
            ("test-type".to_string(), self.test_type.to_string()),
        ]);

        tracing::debug!(
            image = %template.image_uri,
            entrypoint = %template.entrypoint,
            cpu_milli = template.cpu_milli,
            memory_mib = template.memory_mib,
            network = %template.network_path(),
            subnetwork = %template.subnetwork_path(),
            "Job specification",
        );

        template.build()
    }

    fn context(&self, job_id: &str) -> SubmissionContext {
        SubmissionContext {
            job_id: job_id.to_string(),
            project: self.project.clone(),
            region: self.region.clone(),
            test_type: self.test_type,
            target: self.target.clone(),
        }
    }
}

/// Run the whole probe as configured on the command line.
///
/// Resolution and credential failures are returned as errors and no
/// output file is written. Submission failures are recorded in the
/// output file and the returned report.
pub async fn run(cli: &Cli) -> Result<SubmissionReport, RunError> {
    tracing::info!(
        key = %cli.service_account_key.display(),
        "Authentication configured with service account",
    );
    let key = ServiceAccountKey::from_file(&cli.service_account_key)?;

    let project = resolve::resolve_project(cli.project.as_deref(), &key)?;
    let sources = DiscoverySources::new(&cli.mount_path);
    let target = resolve::resolve_target(
        cli.test_type,
        cli.target_host.as_deref(),
        cli.target_port,
        &sources,
    )
    .await?;

    let plan = ProbePlan::from_cli(cli, project, target);

    if cli.dry_run {
        return dry_run(&plan, &cli.output).await;
    }

    tracing::info!("Creating Batch client...");
    let tokens = TokenProvider::new(key)?;
    let client = BatchClient::with_endpoint(tokens, &cli.batch_endpoint);
    tracing::info!(endpoint = %client.endpoint(), "Batch client created");

    submit(&plan, &client, &cli.output).await
}

/// Build the job and write it to `output` without submitting.
pub async fn dry_run(plan: &ProbePlan, output: &Path) -> Result<SubmissionReport, RunError> {
    let job_id = job_id::generate(plan.test_type.job_prefix())?;
    let job = plan.build_job();
    let job_json = serde_json::to_string_pretty(&job)?;

    tracing::info!(job_id = %job_id, "Dry run: job not submitted");

    let report = SubmissionReport::new(plan.context(&job_id), SubmissionOutcome::DryRun { job_json });
    write_report(&report, output).await?;
    Ok(report)
}

/// Submit the plan's job through `submitter` and write the report.
pub async fn submit(
    plan: &ProbePlan,
    submitter: &dyn JobSubmitter,
    output: &Path,
) -> Result<SubmissionReport, RunError> {
    let job_id = job_id::generate(plan.test_type.job_prefix())?;
    tracing::info!(job_id = %job_id, "Generated job name");

    let job = plan.build_job();
    let parent = plan.parent();

    tracing::info!(
        job_id = %job_id,
        project = %plan.project,
        region = %plan.region,
        target = %plan.target,
        test_type = %plan.test_type,
        "Submitting job",
    );

    let outcome = match submitter.submit(&parent, &job_id, &job).await {
        Ok(created) => {
            let name = created.name.unwrap_or_default();
            let uid = created.uid.unwrap_or_default();
            tracing::info!(name = %name, uid = %uid, "Job submitted successfully");
            SubmissionOutcome::Submitted { name, uid }
        }
        Err(e) => {
            let chain = error_chain(&e);
            tracing::error!(kind = e.kind(), error = %e, ?chain, "Error submitting job");
            let message = e.api_message().unwrap_or_else(|| e.to_string());
            SubmissionOutcome::Failed {
                kind: e.kind().to_string(),
                message,
                chain,
            }
        }
    };

    let report = SubmissionReport::new(plan.context(&job_id), outcome);
    write_report(&report, output).await?;
    Ok(report)
}

/// `caused by: …` lines for each source of `err`.
fn error_chain(err: &BatchApiError) -> Vec<String> {
    let mut chain = Vec::new();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        chain.push(format!("caused by: {cause}"));
        source = cause.source();
    }
    chain
}

async fn write_report(report: &SubmissionReport, output: &Path) -> Result<(), RunError> {
    tokio::fs::write(output, report.render())
        .await
        .map_err(|source| RunError::WriteOutput {
            path: output.display().to_string(),
            source,
        })?;
    tracing::info!(path = %output.display(), "Result summary written");
    Ok(())
}
