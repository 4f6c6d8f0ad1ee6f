//! Pub/Sub push endpoint.
//!
//! Pub/Sub delivers each published event as
//!
//! ```json
//! {
//!   "message": { "data": "<base64>", "messageId": "...", "attributes": {} },
//!   "subscription": "projects/p/subscriptions/s"
//! }
//! ```
//!
//! and treats any non-2xx response as a negative acknowledgement.

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::extract::State;
use axum::{routing::post, Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use beacon_core::error::CoreError;
use beacon_push::PushReport;
use serde::Deserialize;
use tracing::Instrument;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PushEnvelope {
    pub message: PubSubMessage,
    #[serde(default)]
    pub subscription: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PubSubMessage {
    /// Base64-encoded event payload.
    #[serde(default)]
    pub data: Option<String>,
    #[serde(rename = "messageId", default)]
    pub message_id: Option<String>,
    /// Publisher-set attributes, recorded on the request span.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl PubSubMessage {
    /// Decode the event payload carried in `data`.
    pub fn payload(&self) -> Result<Vec<u8>, CoreError> {
        let data = self
            .data
            .as_deref()
            .ok_or_else(|| CoreError::MalformedPayload("message has no data".into()))?;
        STANDARD
            .decode(data.trim())
            .map_err(|e| CoreError::MalformedPayload(format!("data is not valid base64: {e}")))
    }

    /// Attributes as `key=value` pairs in key order, for logging.
    pub fn attributes_summary(&self) -> String {
        self.attributes
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// POST /push -- run one push event through the pipeline.
async fn receive_push(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<DataResponse<PushReport>>> {
    let envelope: PushEnvelope = serde_json::from_slice(&body)
        .map_err(|e| CoreError::MalformedPayload(format!("invalid push envelope: {e}")))?;

    let message_id = envelope.message.message_id.as_deref().unwrap_or("-");
    let span = tracing::info_span!(
        "push",
        message_id,
        subscription = envelope.subscription.as_deref().unwrap_or("-"),
        attributes = %envelope.message.attributes_summary(),
    );

    let payload = envelope.message.payload()?;
    let report = state.pipeline.handle(&payload).instrument(span).await?;

    Ok(Json(DataResponse { data: report }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/push", post(receive_push))
}
