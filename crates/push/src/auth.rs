//! OAuth2 access tokens for the FCM HTTP v1 API.
//!
//! [`ServiceAccountTokenSource`] signs an RS256 JWT assertion with a Google
//! service-account key and exchanges it at the key's `token_uri` for a
//! short-lived bearer token, which is cached until shortly before expiry.
//! [`StaticTokenSource`] hands out a fixed token (emulators, tests).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// OAuth scope required to send FCM messages.
pub const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";

/// Google's default OAuth2 token endpoint.
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Lifetime requested for each JWT assertion (Google's maximum).
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Cached tokens are refreshed this long before they expire.
const REFRESH_MARGIN_SECS: i64 = 60;

/// HTTP timeout for the token exchange.
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for credential loading and token exchange.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Failed to read service account key: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid service account key: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to sign token assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("Token exchange request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Token endpoint returned HTTP {status}: {body}")]
    Exchange { status: u16, body: String },
}

// ---------------------------------------------------------------------------
// ServiceAccountKey
// ---------------------------------------------------------------------------

/// The fields of a Google service-account JSON key that we need.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(default)]
    pub project_id: Option<String>,
    pub client_email: String,
    /// PKCS#8 PEM-encoded RSA private key.
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

// ---------------------------------------------------------------------------
// TokenSource
// ---------------------------------------------------------------------------

/// Supplies bearer tokens for provider requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, AuthError>;
}

/// A token source that always returns the same token.
pub struct StaticTokenSource(String);

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn access_token(&self) -> Result<String, AuthError> {
        Ok(self.0.clone())
    }
}

/// Claims of the JWT assertion sent to the token endpoint.
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
    expires_in: i64,
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Exchanges signed service-account assertions for access tokens.
pub struct ServiceAccountTokenSource {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    client: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokenSource {
    /// Build a token source; fails early if the private key is unusable.
    pub fn new(key: ServiceAccountKey) -> Result<Self, AuthError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
        let client = reqwest::Client::builder()
            .timeout(EXCHANGE_TIMEOUT)
            .build()?;
        Ok(Self {
            key,
            encoding_key,
            client,
            cached: Mutex::new(None),
        })
    }

    /// Sign a fresh assertion for the FCM scope.
    pub fn sign_assertion(&self, now: DateTime<Utc>) -> Result<String, AuthError> {
        let iat = now.timestamp();
        let claims = AssertionClaims {
            iss: self.key.client_email.clone(),
            scope: FCM_SCOPE.to_string(),
            aud: self.key.token_uri.clone(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };
        Ok(encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    async fn exchange(&self, now: DateTime<Utc>) -> Result<CachedToken, AuthError> {
        let assertion = self.sign_assertion(now)?;
        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Exchange {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response.json().await?;
        tracing::debug!(expires_in = token.expires_in, "Obtained FCM access token");
        Ok(CachedToken {
            token: token.access_token,
            expires_at: now + chrono::Duration::seconds(token.expires_in),
        })
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn access_token(&self) -> Result<String, AuthError> {
        // Held across the exchange so concurrent sends share one refresh.
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref() {
            if now + chrono::Duration::seconds(REFRESH_MARGIN_SECS) < token.expires_at {
                return Ok(token.token.clone());
            }
        }

        let fresh = self.exchange(now).await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}
