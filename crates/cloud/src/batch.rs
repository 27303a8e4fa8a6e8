//! REST client for the Batch v1 API.
//!
//! Wraps job creation and lookup using [`reqwest`], authenticating each
//! request with a bearer token from [`TokenProvider`].

use async_trait::async_trait;
use serde::Deserialize;

use crate::auth::{AuthError, TokenProvider};
use crate::job::Job;

/// Public Batch v1 endpoint.
pub const DEFAULT_BATCH_ENDPOINT: &str = "https://batch.googleapis.com/v1";

/// Errors from the Batch REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum BatchApiError {
    /// Could not obtain an access token.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Batch returned a non-2xx status code.
    #[error("Batch API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl BatchApiError {
    /// Short name of the error variant, used in the result report.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(_) => "AuthError",
            Self::Request(_) => "RequestError",
            Self::Api { .. } => "ApiError",
        }
    }

    /// The `error.message` field of a Google API error body, if present.
    pub fn api_message(&self) -> Option<String> {
        #[derive(Deserialize)]
        struct Envelope {
            error: ErrorBody,
        }
        #[derive(Deserialize)]
        struct ErrorBody {
            message: String,
        }

        match self {
            Self::Api { body, .. } => serde_json::from_str::<Envelope>(body)
                .ok()
                .map(|e| e.error.message),
            _ => None,
        }
    }
}

/// Anything that can create a Batch job.
///
/// Implemented by [`BatchClient`]; the probe runner only depends on this
/// trait so it can be driven by an in-memory submitter in tests.
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    /// Create `job` under `parent` with the given id and return the
    /// resource as stored by the service.
    async fn submit(&self, parent: &str, job_id: &str, job: &Job) -> Result<Job, BatchApiError>;
}

/// HTTP client for the Batch v1 API.
pub struct BatchClient {
    client: reqwest::Client,
    endpoint: String,
    tokens: TokenProvider,
}

impl BatchClient {
    /// Create a client against the public endpoint.
    pub fn new(tokens: TokenProvider) -> Self {
        Self::with_endpoint(tokens, DEFAULT_BATCH_ENDPOINT)
    }

    /// Create a client against a custom endpoint, e.g. a regional one.
    pub fn with_endpoint(tokens: TokenProvider, endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Create a job.
    ///
    /// Sends `POST {endpoint}/{parent}/jobs?job_id={job_id}` with the job
    /// as the JSON body.
    pub async fn create_job(
        &self,
        parent: &str,
        job_id: &str,
        job: &Job,
    ) -> Result<Job, BatchApiError> {
        let token = self.tokens.access_token().await?;

        tracing::debug!(parent, job_id, endpoint = %self.endpoint, "POST create job");

        let response = self
            .client
            .post(format!("{}/{parent}/jobs", self.endpoint))
            .query(&[("job_id", job_id)])
            .bearer_auth(token)
            .json(job)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Fetch a job by its full resource name.
    pub async fn get_job(&self, name: &str) -> Result<Job, BatchApiError> {
        let token = self.tokens.access_token().await?;

        let response = self
            .client
            .get(format!("{}/{name}", self.endpoint))
            .bearer_auth(token)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code, or turn it into a
    /// [`BatchApiError::Api`] carrying the status and body text.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, BatchApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(BatchApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BatchApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl JobSubmitter for BatchClient {
    async fn submit(&self, parent: &str, job_id: &str, job: &Job) -> Result<Job, BatchApiError> {
        self.create_job(parent, job_id, job).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_message_is_extracted_from_google_error_body() {
        let err = BatchApiError::Api {
            status: 403,
            body: r#"{"error": {"code": 403, "message": "Permission denied on resource project galaxy-dev.", "status": "PERMISSION_DENIED"}}"#.to_string(),
        };
        assert_eq!(err.kind(), "ApiError");
        assert_eq!(
            err.api_message().as_deref(),
            Some("Permission denied on resource project galaxy-dev.")
        );
    }

    #[test]
    fn api_message_absent_for_plain_bodies() {
        let err = BatchApiError::Api {
            status: 502,
            body: "Bad Gateway".to_string(),
        };
        assert_eq!(err.api_message(), None);
        assert_eq!(err.to_string(), "Batch API error (502): Bad Gateway");
    }
}
