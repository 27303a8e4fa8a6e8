//! Probe variants.
//!
//! Each [`TestType`] decides where its target comes from, which port is
//! probed by default, and which diagnostic sections end up in the job
//! script.

use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// NFS server port.
pub const NFS_PORT: u16 = 2049;
/// Plain HTTP port.
pub const HTTP_PORT: u16 = 80;
/// DNS port.
pub const DNS_PORT: u16 = 53;

/// Resolver probed by [`TestType::PublicDns`] when no host is given.
pub const PUBLIC_DNS_RESOLVER: &str = "8.8.8.8";

/// Which kind of target the batch job probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TestType {
    /// NFS server backing the shared database mount.
    #[default]
    Nfs,
    /// An HTTP service.
    Web,
    /// The in-cluster DNS service (`kube-dns`).
    ClusterDns,
    /// A public DNS resolver.
    PublicDns,
    /// Bare `nc -z` against the NFS port, no script.
    Netcat,
}

impl TestType {
    pub const ALL: [TestType; 5] = [
        TestType::Nfs,
        TestType::Web,
        TestType::ClusterDns,
        TestType::PublicDns,
        TestType::Netcat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nfs => "nfs",
            Self::Web => "web",
            Self::ClusterDns => "cluster-dns",
            Self::PublicDns => "public-dns",
            Self::Netcat => "netcat",
        }
    }

    /// Port probed when none is supplied on the command line.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Nfs | Self::Netcat => NFS_PORT,
            Self::Web => HTTP_PORT,
            Self::ClusterDns | Self::PublicDns => DNS_PORT,
        }
    }

    /// Host used when none is supplied and nothing needs discovering.
    pub fn default_host(&self) -> Option<&'static str> {
        match self {
            Self::PublicDns => Some(PUBLIC_DNS_RESOLVER),
            _ => None,
        }
    }

    /// Prefix of the generated Batch job id.
    pub fn job_prefix(&self) -> &'static str {
        match self {
            Self::Nfs => "nfs-test",
            Self::Web => "web-test",
            Self::ClusterDns => "cluster-dns-test",
            Self::PublicDns => "public-dns-test",
            Self::Netcat => "netcat-job",
        }
    }

    /// Label of the target line in the result report.
    pub fn target_label(&self) -> &'static str {
        match self {
            Self::Nfs | Self::Netcat => "NFS Address",
            Self::Web => "Web Service",
            Self::ClusterDns => "Cluster DNS",
            Self::PublicDns => "Public DNS",
        }
    }

    /// Whether the target is discovered from the local mount table.
    pub fn uses_mount_discovery(&self) -> bool {
        matches!(self, Self::Nfs | Self::Netcat)
    }

    /// Whether the job container needs `--privileged` (for `mount -t nfs`).
    pub fn needs_privileged_container(&self) -> bool {
        matches!(self, Self::Nfs)
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        TestType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| CoreError::UnknownTestType(s.to_string()))
    }
}
