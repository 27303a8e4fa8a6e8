//! `netprobe` -- submit a one-shot network probe as a Google Batch job.
//!
//! Resolves the project and target, builds a job that runs a diagnostic
//! script (or a bare `nc -z`) inside the project's VPC, submits it, and
//! writes a plain-text summary to `--output`.
//!
//! Logs go to stdout: the workflow engines that run this tool treat any
//! stderr output as a failed step.
//!
//! # Environment variables
//!
//! | Variable                         | Flag                    |
//! |----------------------------------|-------------------------|
//! | `GOOGLE_APPLICATION_CREDENTIALS` | `--service-account-key` |
//! | `NETPROBE_REGION`                | `--region`              |
//! | `NETPROBE_PROJECT`               | `--project`             |
//! | `NETPROBE_TEST_TYPE`             | `--test-type`           |
//! | `NETPROBE_IMAGE`                 | `--image`               |
//! | `NETPROBE_BATCH_ENDPOINT`        | `--batch-endpoint`      |
//! | `NETPROBE_LOG_FORMAT`            | `--log-format`          |
//! | `RUST_LOG`                       | log filter              |

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use netprobe::cli::{Cli, LogFormat};
use netprobe::runner;

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "netprobe=info,netprobe_cloud=info";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match runner::run(&cli).await {
        Ok(report) => {
            tracing::info!(
                output = %cli.output.display(),
                submitted = report.is_success(),
                "Probe finished",
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Probe failed");
            std::process::exit(1);
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stdout),
            )
            .init(),
    }
}
