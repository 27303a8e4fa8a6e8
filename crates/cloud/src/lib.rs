//! Google Cloud plumbing for the network probe.
//!
//! Loads service-account keys, exchanges them for OAuth2 access tokens,
//! models the Batch v1 `Job` resource, and wraps the single REST call
//! used to create jobs.

pub mod auth;
pub mod batch;
pub mod credentials;
pub mod job;
