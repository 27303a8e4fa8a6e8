//! Project and target resolution.
//!
//! The project id comes from the command line or the service-account key.
//! The target host comes from the command line, or is discovered per test
//! type: the local mount table for NFS probes, `kubectl` for cluster DNS,
//! a fixed resolver for public DNS.

use std::path::PathBuf;
use std::time::Duration;

use tokio::process::Command;

use netprobe_cloud::credentials::{CredentialsError, ServiceAccountKey};
use netprobe_core::error::CoreError;
use netprobe_core::target::{parse_mount_output, parse_proc_mounts, Target};
use netprobe_core::test_type::TestType;

/// Timeout for each discovery subprocess.
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Credentials(#[from] CredentialsError),

    #[error(transparent)]
    Target(#[from] CoreError),

    #[error("Could not auto-detect NFS server address from {0} mount")]
    MountNotFound(String),

    #[error("--target-host is required for {0} probes")]
    HostRequired(TestType),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with code {exit_code}: {stderr}")]
    CommandFailed {
        program: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("{program} timed out after {secs}s", secs = DISCOVERY_TIMEOUT.as_secs())]
    Timeout { program: String },

    #[error("kubectl returned no cluster IP for service {0}")]
    EmptyClusterIp(String),
}

/// Pick the project id: explicit flag first, then the key file.
pub fn resolve_project(
    flag: Option<&str>,
    key: &ServiceAccountKey,
) -> Result<String, ResolveError> {
    if let Some(project) = flag.map(str::trim).filter(|p| !p.is_empty()) {
        tracing::info!(project, "Using provided project ID");
        return Ok(project.to_string());
    }

    let project = key.project_id()?;
    tracing::info!(project, "Extracted project ID from service account key");
    Ok(project.to_string())
}

/// Where discovery looks for target hosts.
#[derive(Debug, Clone)]
pub struct DiscoverySources {
    /// Mount point whose NFS server is wanted.
    pub mount_path: String,
    /// Program listing mounts (`mount`).
    pub mount_program: String,
    /// Fallback mount table.
    pub proc_mounts: PathBuf,
    /// Program queried for the cluster DNS service IP (`kubectl`).
    pub kubectl_program: String,
    pub dns_service: String,
    pub dns_namespace: String,
}

impl DiscoverySources {
    pub fn new(mount_path: impl Into<String>) -> Self {
        Self {
            mount_path: mount_path.into(),
            ..Self::default()
        }
    }
}

impl Default for DiscoverySources {
    fn default() -> Self {
        Self {
            mount_path: netprobe_core::target::DEFAULT_MOUNT_PATH.to_string(),
            mount_program: "mount".to_string(),
            proc_mounts: PathBuf::from("/proc/mounts"),
            kubectl_program: "kubectl".to_string(),
            dns_service: "kube-dns".to_string(),
            dns_namespace: "kube-system".to_string(),
        }
    }
}

/// Resolve the probe target for `test_type`.
///
/// An explicit host always wins; the port defaults per test type.
pub async fn resolve_target(
    test_type: TestType,
    host_flag: Option<&str>,
    port_flag: Option<u16>,
    sources: &DiscoverySources,
) -> Result<Target, ResolveError> {
    let port = port_flag.unwrap_or_else(|| test_type.default_port());

    let host = match host_flag.map(str::trim).filter(|h| !h.is_empty()) {
        Some(host) => {
            tracing::info!(host, %test_type, "Using provided target host");
            host.to_string()
        }
        None => discover_host(test_type, sources).await?,
    };

    Ok(Target::new(host, port)?)
}

async fn discover_host(
    test_type: TestType,
    sources: &DiscoverySources,
) -> Result<String, ResolveError> {
    if test_type.uses_mount_discovery() {
        return discover_nfs_server(sources).await;
    }

    match test_type {
        TestType::ClusterDns => discover_cluster_dns(sources).await,
        _ => match test_type.default_host() {
            Some(host) => {
                tracing::info!(host, %test_type, "Using default target host");
                Ok(host.to_string())
            }
            None => Err(ResolveError::HostRequired(test_type)),
        },
    }
}

/// Find the NFS server behind the configured mount point, trying `mount`
/// output first and `/proc/mounts` second.
pub async fn discover_nfs_server(sources: &DiscoverySources) -> Result<String, ResolveError> {
    match run_capture(&sources.mount_program, &[]).await {
        Ok(output) => {
            if let Some(server) = parse_mount_output(&output, &sources.mount_path) {
                tracing::info!(server = %server, "Detected NFS address from mount");
                return Ok(server);
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "mount listing failed, falling back to mount table");
        }
    }

    match tokio::fs::read_to_string(&sources.proc_mounts).await {
        Ok(contents) => {
            if let Some(server) = parse_proc_mounts(&contents, &sources.mount_path) {
                tracing::info!(
                    server = %server,
                    path = %sources.proc_mounts.display(),
                    "Detected NFS address from mount table",
                );
                return Ok(server);
            }
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                path = %sources.proc_mounts.display(),
                "Could not read mount table",
            );
        }
    }

    Err(ResolveError::MountNotFound(sources.mount_path.clone()))
}

/// Ask `kubectl` for the cluster IP of the DNS service.
pub async fn discover_cluster_dns(sources: &DiscoverySources) -> Result<String, ResolveError> {
    let output = run_capture(
        &sources.kubectl_program,
        &[
            "get",
            "svc",
            &sources.dns_service,
            "-n",
            &sources.dns_namespace,
            "-o",
            "jsonpath={.spec.clusterIP}",
        ],
    )
    .await?;

    let ip = output.trim().trim_matches('\'').to_string();
    if ip.is_empty() || ip == "None" {
        return Err(ResolveError::EmptyClusterIp(sources.dns_service.clone()));
    }

    tracing::info!(cluster_ip = %ip, service = %sources.dns_service, "Detected cluster DNS address");
    Ok(ip)
}

/// Run `program args...` and return its stdout, failing on non-zero exit
/// or after [`DISCOVERY_TIMEOUT`].
async fn run_capture(program: &str, args: &[&str]) -> Result<String, ResolveError> {
    tracing::debug!(program, ?args, "Running discovery command");

    let result = tokio::time::timeout(
        DISCOVERY_TIMEOUT,
        Command::new(program).args(args).kill_on_drop(true).output(),
    )
    .await;

    match result {
        Ok(Ok(output)) if output.status.success() => {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        Ok(Ok(output)) => Err(ResolveError::CommandFailed {
            program: program.to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }),
        Ok(Err(source)) => Err(ResolveError::Spawn {
            program: program.to_string(),
            source,
        }),
        Err(_) => Err(ResolveError::Timeout {
            program: program.to_string(),
        }),
    }
}
