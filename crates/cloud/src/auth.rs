//! OAuth2 access tokens via the JWT-bearer grant.
//!
//! A short-lived RS256 assertion signed with the service account's private
//! key is exchanged at the key's `token_uri` for a bearer token. Tokens are
//! cached until shortly before they expire.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::credentials::ServiceAccountKey;

/// Scope granting access to all Cloud APIs the account is authorised for.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for the signed assertion (Google's maximum).
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Cached tokens are refreshed this long before their expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid service account private key: {0}")]
    InvalidKey(#[source] jsonwebtoken::errors::Error),

    #[error("failed to sign token assertion: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("token endpoint error ({status}): {body}")]
    TokenEndpoint { status: u16, body: String },
}

/// Claims of the assertion sent to the token endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Issues access tokens for one service account.
pub struct TokenProvider {
    client: reqwest::Client,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    scope: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    /// Create a provider for `key` with the cloud-platform scope.
    ///
    /// Fails early if the private key is not a valid RSA PEM.
    pub fn new(key: ServiceAccountKey) -> Result<Self, AuthError> {
        Self::with_client(reqwest::Client::new(), key)
    }

    /// Create a provider reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, key: ServiceAccountKey) -> Result<Self, AuthError> {
        let encoding_key =
            EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(AuthError::InvalidKey)?;
        Ok(Self {
            client,
            key,
            encoding_key,
            scope: CLOUD_PLATFORM_SCOPE.to_string(),
            cached: Mutex::new(None),
        })
    }

    /// Build and sign the JWT assertion for the given issue time.
    pub fn assertion(&self, now: DateTime<Utc>) -> Result<String, AuthError> {
        let iat = now.timestamp();
        let claims = AssertionClaims {
            iss: self.key.client_email.clone(),
            scope: self.scope.clone(),
            aud: self.key.token_uri.clone(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        encode(&header, &claims, &self.encoding_key).map_err(AuthError::Signing)
    }

    /// Return a valid access token, fetching a new one if needed.
    pub async fn access_token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref() {
            if token.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) > now {
                return Ok(token.value.clone());
            }
        }

        let token = self.fetch_token(now).await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn fetch_token(&self, now: DateTime<Utc>) -> Result<CachedToken, AuthError> {
        let assertion = self.assertion(now)?;

        tracing::debug!(
            token_uri = %self.key.token_uri,
            client_email = %self.key.client_email,
            "Requesting access token",
        );

        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(AuthError::TokenEndpoint {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = token.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS);
        tracing::info!(expires_in = lifetime, "Access token obtained");

        Ok(CachedToken {
            value: token.access_token,
            expires_at: now + Duration::seconds(lifetime),
        })
    }
}
