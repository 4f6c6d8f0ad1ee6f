//! Decoding and validation of inbound push events.
//!
//! The wire schema is fixed for compatibility with existing publishers:
//!
//! ```json
//! {
//!   "title": "string",
//!   "body": "string",
//!   "user_id": "string",
//!   "data": { "key": "string" },
//!   "collapse_key": "string"
//! }
//! ```
//!
//! `data` and `collapse_key` are optional.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::CoreError;
use crate::notification::NotificationRequest;

/// Raw inbound event exactly as published on the queue.
///
/// Every field may be `null`; publishers send `null` for empty strings.
#[derive(Debug, Deserialize)]
struct PushNotificationPayload {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    data: Option<BTreeMap<String, Option<String>>>,
    #[serde(default)]
    collapse_key: Option<String>,
}

/// Take a required string field; absent, `null` and whitespace-only are missing.
fn required(value: Option<String>, field: &'static str) -> Result<String, CoreError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(CoreError::MissingRequiredField(field))
}

/// Parse and validate a raw event into a [`NotificationRequest`].
///
/// Required fields are checked in the order `user_id`, `title`, `body`; a
/// `null` or whitespace-only value counts as missing. An empty
/// `collapse_key` is treated as absent and `null` data values become empty
/// strings.
pub fn validate(raw: &[u8]) -> Result<NotificationRequest, CoreError> {
    let payload: PushNotificationPayload =
        serde_json::from_slice(raw).map_err(|e| CoreError::MalformedPayload(e.to_string()))?;

    let user_id = required(payload.user_id, "user_id")?;
    let title = required(payload.title, "title")?;
    let body = required(payload.body, "body")?;

    let data = payload
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| (key, value.unwrap_or_default()))
        .collect();

    Ok(NotificationRequest {
        user_id,
        title,
        body,
        data,
        collapse_key: payload.collapse_key.filter(|k| !k.is_empty()),
    })
}
