//! Request and outcome types shared by the dispatcher and the reconciler.

use std::collections::BTreeMap;

use serde::Serialize;

/// A validated push request for a single user.
///
/// Only [`validate`](crate::validation::validate) constructs these, so the
/// non-empty invariants on `user_id`, `title` and `body` always hold.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRequest {
    pub(crate) user_id: String,
    pub(crate) title: String,
    pub(crate) body: String,
    pub(crate) data: BTreeMap<String, String>,
    pub(crate) collapse_key: Option<String>,
}

impl NotificationRequest {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Arbitrary key/value payload forwarded to the app unchanged.
    pub fn data(&self) -> &BTreeMap<String, String> {
        &self.data
    }

    /// Android coalescing key; `None` when the request did not carry one.
    pub fn collapse_key(&self) -> Option<&str> {
        self.collapse_key.as_deref()
    }
}

/// Classification of a single send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Success,
    /// The provider reported the token as permanently unusable.
    InvalidToken,
    /// The attempt failed without telling us anything about the token.
    TransientError,
}

/// Result of sending the notification to one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryOutcome {
    pub token: String,
    pub status: DeliveryStatus,
    /// Provider message id on success, error description otherwise.
    pub detail: String,
}

impl DeliveryOutcome {
    pub fn success(token: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            status: DeliveryStatus::Success,
            detail: detail.into(),
        }
    }

    pub fn invalid(token: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            status: DeliveryStatus::InvalidToken,
            detail: detail.into(),
        }
    }

    pub fn transient(token: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            status: DeliveryStatus::TransientError,
            detail: detail.into(),
        }
    }
}
