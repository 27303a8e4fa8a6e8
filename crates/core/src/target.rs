//! Probe targets and mount-table parsing.
//!
//! The target host ends up inside a generated bash script, so it is
//! validated against a strict character set before anything else sees it.

use std::fmt;

use crate::error::CoreError;

/// Mount point whose NFS server is probed when no host is given.
pub const DEFAULT_MOUNT_PATH: &str = "/galaxy/server/database";

/// Longest DNS name allowed.
const MAX_HOST_LEN: usize = 253;

/// Allowed host characters: alphanumeric, dot, hyphen, underscore, colon
/// (IPv6). Anything else could break out of the script's quoting. A
/// leading hyphen would be read as an option by `nc`, `getent` and friends.
pub fn is_safe_host(host: &str) -> bool {
    !host.is_empty()
        && host.len() <= MAX_HOST_LEN
        && !host.starts_with('-')
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':'))
}

/// A validated `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    host: String,
    port: u16,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, CoreError> {
        let host = host.into();
        if !is_safe_host(&host) {
            return Err(CoreError::UnsafeHost(host));
        }
        if port == 0 {
            return Err(CoreError::InvalidPort(port));
        }
        Ok(Self { host, port })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Extract the NFS server from `mount` command output.
///
/// Lines look like `10.0.0.5:/export on /galaxy/server/database type nfs (rw,...)`.
/// The first whitespace token with exactly one `:` is taken as
/// `server:/path`.
pub fn parse_mount_output(output: &str, mount_path: &str) -> Option<String> {
    output
        .lines()
        .filter(|line| line.contains(mount_path) && line.contains(':'))
        .find_map(|line| {
            line.split_whitespace()
                .find(|part| part.matches(':').count() == 1)
                .and_then(|part| part.split(':').next())
                .filter(|server| !server.is_empty())
                .map(str::to_string)
        })
}

/// Extract the NFS server from `/proc/mounts` contents.
///
/// Lines look like `10.0.0.5:/export /galaxy/server/database nfs4 rw,... 0 0`;
/// only the first field is considered.
pub fn parse_proc_mounts(contents: &str, mount_path: &str) -> Option<String> {
    contents
        .lines()
        .filter(|line| line.contains(mount_path) && line.contains(':'))
        .find_map(|line| {
            line.split_whitespace()
                .next()
                .filter(|device| device.contains(':'))
                .and_then(|device| device.split(':').next())
                .filter(|server| !server.is_empty())
                .map(str::to_string)
        })
}
