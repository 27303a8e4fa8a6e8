#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Unknown test type: {0} (expected one of nfs, web, cluster-dns, public-dns, netcat)")]
    UnknownTestType(String),

    #[error("Unsafe target host: {0:?}")]
    UnsafeHost(String),

    #[error("Invalid target port: {0}")]
    InvalidPort(u16),

    #[error("Invalid job id: {0:?}")]
    InvalidJobId(String),
}
