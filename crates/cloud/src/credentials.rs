//! Service-account key files.
//!
//! Only the fields needed for the JWT-bearer grant are read; the rest of
//! the key file is ignored.

use std::path::Path;

use serde::Deserialize;

/// Token endpoint used when the key file does not name one.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("failed to read service account key {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid service account key: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unsupported credential type {0:?} (expected \"service_account\")")]
    UnsupportedType(String),

    #[error("project_id not found in service account key file")]
    MissingProjectId,
}

/// A parsed service-account JSON key.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type", default)]
    pub key_type: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

// Keeps the private key out of logs.
impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CredentialsError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| CredentialsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self, CredentialsError> {
        let key: Self = serde_json::from_str(json)?;
        match key.key_type.as_deref() {
            None | Some("service_account") => Ok(key),
            Some(other) => Err(CredentialsError::UnsupportedType(other.to_string())),
        }
    }

    /// The project the key belongs to.
    pub fn project_id(&self) -> Result<&str, CredentialsError> {
        self.project_id
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or(CredentialsError::MissingProjectId)
    }
}
