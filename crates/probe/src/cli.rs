//! Command-line flags.
//!
//! Most flags fall back to an environment variable, and `.env` is loaded
//! before parsing, so the tool can be configured either way. Underscore
//! spellings of the original flags (`--service_account_key`,
//! `--nfs_address`) are accepted as aliases.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use netprobe_cloud::batch::DEFAULT_BATCH_ENDPOINT;
use netprobe_cloud::job::DEFAULT_MAX_RUN_DURATION_SECS;
use netprobe_core::target::DEFAULT_MOUNT_PATH;
use netprobe_core::test_type::TestType;

/// Container image carrying `nc` and the diagnostic tools.
pub const DEFAULT_IMAGE: &str = "afgane/gcp-batch-netcat:0.2.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Submit a one-shot Google Batch job that probes network reachability of
/// a target (NFS server, web service, cluster DNS or public DNS) from
/// inside the project's VPC.
#[derive(Debug, Clone, Parser)]
#[command(name = "netprobe", version, about)]
pub struct Cli {
    /// File the result summary is written to.
    #[arg(long)]
    pub output: PathBuf,

    /// Batch region, e.g. `us-east4`.
    #[arg(long, env = "NETPROBE_REGION")]
    pub region: String,

    /// Service-account JSON key used to authenticate.
    #[arg(
        long,
        alias = "service_account_key",
        env = "GOOGLE_APPLICATION_CREDENTIALS"
    )]
    pub service_account_key: PathBuf,

    /// GCP project id (default: `project_id` from the key file).
    #[arg(long, env = "NETPROBE_PROJECT")]
    pub project: Option<String>,

    /// What to probe.
    #[arg(long, env = "NETPROBE_TEST_TYPE", default_value_t = TestType::Nfs)]
    pub test_type: TestType,

    /// Target host (default: discovered per test type).
    #[arg(long, visible_alias = "nfs-address", alias = "nfs_address")]
    pub target_host: Option<String>,

    /// Target port (default: per test type).
    #[arg(long)]
    pub target_port: Option<u16>,

    /// Mount point whose NFS server is probed when no host is given.
    #[arg(long, default_value = DEFAULT_MOUNT_PATH)]
    pub mount_path: String,

    /// VPC network name.
    #[arg(long, default_value = "default")]
    pub network: String,

    /// Subnetwork name.
    #[arg(long, default_value = "default")]
    pub subnet: String,

    /// Container image the job runs.
    #[arg(long, env = "NETPROBE_IMAGE", default_value = DEFAULT_IMAGE)]
    pub image: String,

    /// Task wall-clock limit.
    #[arg(long, default_value_t = DEFAULT_MAX_RUN_DURATION_SECS)]
    pub max_run_duration_secs: u64,

    /// Batch API base URL.
    #[arg(long, env = "NETPROBE_BATCH_ENDPOINT", default_value = DEFAULT_BATCH_ENDPOINT)]
    pub batch_endpoint: String,

    /// Build the job and write it to the output file without submitting.
    #[arg(long)]
    pub dry_run: bool,

    /// Log line format.
    #[arg(long, env = "NETPROBE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    const REQUIRED: [&str; 7] = [
        "netprobe",
        "--output",
        "out.txt",
        "--region",
        "us-east4",
        "--service-account-key",
        "key.json",
    ];

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(REQUIRED).expect("parses");
        assert_eq!(cli.test_type, TestType::Nfs);
        assert_eq!(cli.mount_path, "/galaxy/server/database");
        assert_eq!(cli.network, "default");
        assert_eq!(cli.subnet, "default");
        assert_eq!(cli.max_run_duration_secs, 600);
        assert!(!cli.dry_run);
        assert_eq!(cli.target_host, None);
    }

    #[test]
    fn underscore_aliases_are_accepted() {
        let cli = Cli::try_parse_from([
            "netprobe",
            "--output",
            "out.txt",
            "--region",
            "us-east4",
            "--service_account_key",
            "key.json",
            "--nfs_address",
            "10.0.0.5",
        ])
        .expect("parses");
        assert_eq!(cli.service_account_key, PathBuf::from("key.json"));
        assert_eq!(cli.target_host.as_deref(), Some("10.0.0.5"));
    }

    #[test]
    fn test_type_and_port() {
        let mut args = REQUIRED.to_vec();
        args.extend(["--test-type", "cluster-dns", "--target-port", "5353", "--dry-run"]);
        let cli = Cli::try_parse_from(args).expect("parses");
        assert_eq!(cli.test_type, TestType::ClusterDns);
        assert_eq!(cli.target_port, Some(5353));
        assert!(cli.dry_run);
    }

    #[test]
    fn unknown_test_type_is_rejected() {
        let mut args = REQUIRED.to_vec();
        args.extend(["--test-type", "smtp"]);
        assert!(Cli::try_parse_from(args).is_err());
    }
}
