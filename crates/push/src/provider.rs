//! Messaging provider seam and the provider-neutral message shape.
//!
//! [`Message`] serializes to the FCM HTTP v1 `message` object, which is also
//! the shape every provider adapter in this crate consumes.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Title and body shown by the OS on every platform.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

/// Android presentation attributes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AndroidNotification {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// `#rrggbb` accent color.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Android-specific delivery options.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AndroidConfig {
    /// Messages sharing a collapse key replace each other while the device
    /// is offline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collapse_key: Option<String>,
    pub notification: AndroidNotification,
}

/// A push message addressed to exactly one device token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub token: String,
    pub notification: Notification,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
    pub android: AndroidConfig,
}

// ---------------------------------------------------------------------------
// Errors and receipts
// ---------------------------------------------------------------------------

/// Provider error codes, following the FCM HTTP v1 error taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderErrorCode {
    /// The token is no longer registered (app uninstalled, token rotated).
    Unregistered,
    /// The request was rejected as invalid; may or may not be the token.
    InvalidArgument,
    /// The token belongs to a different sender project.
    SenderIdMismatch,
    QuotaExceeded,
    Unavailable,
    Internal,
    /// APNs/web-push credentials on the provider side are broken.
    ThirdPartyAuthError,
    /// No response before the deadline.
    Timeout,
    /// Connection-level failure before a response was received.
    Transport,
    /// Our own provider credentials could not be obtained.
    Authentication,
    Unknown(String),
}

impl ProviderErrorCode {
    /// Parse an FCM `errorCode` / `status` string.
    ///
    /// Generic statuses such as `NOT_FOUND` or `PERMISSION_DENIED` are left
    /// as [`Unknown`](Self::Unknown): they also describe project-level
    /// misconfiguration and must never be read as a verdict on the token.
    pub fn from_fcm(code: &str) -> Self {
        match code {
            "UNREGISTERED" => Self::Unregistered,
            "INVALID_ARGUMENT" => Self::InvalidArgument,
            "SENDER_ID_MISMATCH" => Self::SenderIdMismatch,
            "QUOTA_EXCEEDED" | "RESOURCE_EXHAUSTED" => Self::QuotaExceeded,
            "UNAVAILABLE" => Self::Unavailable,
            "INTERNAL" => Self::Internal,
            "THIRD_PARTY_AUTH_ERROR" => Self::ThirdPartyAuthError,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl std::fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unregistered => write!(f, "UNREGISTERED"),
            Self::InvalidArgument => write!(f, "INVALID_ARGUMENT"),
            Self::SenderIdMismatch => write!(f, "SENDER_ID_MISMATCH"),
            Self::QuotaExceeded => write!(f, "QUOTA_EXCEEDED"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::Internal => write!(f, "INTERNAL"),
            Self::ThirdPartyAuthError => write!(f, "THIRD_PARTY_AUTH_ERROR"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::Transport => write!(f, "TRANSPORT"),
            Self::Authentication => write!(f, "AUTHENTICATION"),
            Self::Unknown(code) => write!(f, "{code}"),
        }
    }
}

/// A failed send, as reported by a [`MessagingProvider`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code} (retryable: {retryable}): {detail}")]
pub struct ProviderError {
    pub code: ProviderErrorCode,
    /// Whether the same message could succeed if sent again later.
    pub retryable: bool,
    pub detail: String,
}

impl ProviderError {
    pub fn new(code: ProviderErrorCode, retryable: bool, detail: impl Into<String>) -> Self {
        Self {
            code,
            retryable,
            detail: detail.into(),
        }
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Timeout, true, detail)
    }
}

/// Provider acknowledgement of an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Provider-assigned message name, e.g. `projects/p/messages/0:123`.
    pub message_id: String,
}

// ---------------------------------------------------------------------------
// MessagingProvider
// ---------------------------------------------------------------------------

/// Sends one message to one device token.
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn send(&self, message: &Message) -> Result<DeliveryReceipt, ProviderError>;
}
