//! Firebase Cloud Messaging HTTP v1 provider.
//!
//! [`FcmClient`] posts one [`Message`] per request to
//! `{endpoint}/v1/projects/{project_id}/messages:send` and maps FCM's error
//! envelope onto [`ProviderError`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::auth::TokenSource;
use crate::provider::{
    DeliveryReceipt, Message, MessagingProvider, ProviderError, ProviderErrorCode,
};

/// Production FCM endpoint.
pub const DEFAULT_FCM_ENDPOINT: &str = "https://fcm.googleapis.com";

/// HTTP timeout for a single send when none is configured.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Error type for building an [`FcmClient`].
#[derive(Debug, thiserror::Error)]
pub enum FcmError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Configuration for [`FcmClient`].
#[derive(Debug, Clone)]
pub struct FcmConfig {
    /// Firebase project id messages are sent through.
    pub project_id: String,
    /// Base URL, without a trailing slash.
    pub endpoint: String,
    pub request_timeout: Duration,
}

impl FcmConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            endpoint: DEFAULT_FCM_ENDPOINT.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Serialize)]
struct SendRequest<'a> {
    message: &'a Message,
}

#[derive(Deserialize)]
struct SendResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "errorCode", default)]
    error_code: Option<String>,
}

/// Sends messages through the FCM HTTP v1 API.
pub struct FcmClient {
    client: reqwest::Client,
    send_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl FcmClient {
    pub fn new(config: FcmConfig, tokens: Arc<dyn TokenSource>) -> Result<Self, FcmError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let send_url = format!(
            "{}/v1/projects/{}/messages:send",
            config.endpoint.trim_end_matches('/'),
            config.project_id
        );
        Ok(Self {
            client,
            send_url,
            tokens,
        })
    }
}

#[async_trait]
impl MessagingProvider for FcmClient {
    async fn send(&self, message: &Message) -> Result<DeliveryReceipt, ProviderError> {
        let bearer = self.tokens.access_token().await.map_err(|e| {
            ProviderError::new(ProviderErrorCode::Authentication, true, e.to_string())
        })?;

        let response = self
            .client
            .post(&self.send_url)
            .bearer_auth(bearer)
            .json(&SendRequest { message })
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            let body: SendResponse = response.json().await.map_err(transport_error)?;
            return Ok(DeliveryReceipt {
                message_id: body.name,
            });
        }

        let body = response.text().await.unwrap_or_default();
        Err(parse_error(status.as_u16(), &body))
    }
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    let code = if err.is_timeout() {
        ProviderErrorCode::Timeout
    } else {
        ProviderErrorCode::Transport
    };
    ProviderError::new(code, true, err.to_string())
}

/// Map an FCM error response onto a [`ProviderError`].
///
/// The FCM-specific `errorCode` in `details` wins over the generic gRPC
/// `status`. Rate limiting (429) and server errors (5xx) are retryable.
pub fn parse_error(http_status: u16, body: &str) -> ProviderError {
    let retryable = http_status == 429 || http_status >= 500;

    let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) else {
        return ProviderError::new(
            ProviderErrorCode::Unknown(format!("HTTP_{http_status}")),
            retryable,
            body.chars().take(200).collect::<String>(),
        );
    };

    let raw_code = envelope
        .error
        .details
        .iter()
        .find_map(|d| d.error_code.as_deref())
        .or(envelope.error.status.as_deref());

    let code = match raw_code {
        Some(raw) => ProviderErrorCode::from_fcm(raw),
        None => ProviderErrorCode::Unknown(format!("HTTP_{http_status}")),
    };

    ProviderError::new(code, retryable, envelope.error.message)
}
