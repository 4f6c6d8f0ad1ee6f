//! Concurrent fan-out of one notification to every token of a user.
//!
//! [`NotificationDispatcher`] sends one [`Message`] per token on a bounded
//! pool of tasks and turns every result, including timeouts and panics,
//! into exactly one [`DeliveryOutcome`]. A failed send is data, never a
//! request-level error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use beacon_core::error::CoreError;
use beacon_core::notification::{DeliveryOutcome, DeliveryStatus, NotificationRequest};
use beacon_core::types::{redact_token, TokenSet};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};

use crate::classify::Classifier;
use crate::provider::{
    AndroidConfig, AndroidNotification, Message, MessagingProvider, Notification, ProviderError,
};

/// Default upper bound on in-flight sends for one request.
pub const DEFAULT_MAX_CONCURRENT_SENDS: usize = 16;

/// Default timeout for a single provider call.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Notification icon shown on Android when none is configured.
pub const DEFAULT_ANDROID_ICON: &str = "https://firebasestorage.googleapis.com/v0/b/gatrabali.appspot.com/o/app%2Fnotification.png?alt=media&token=b76afe54-fc9c-4a05-addb-3f9eaaee7d2f";

const DEADLINE_BEFORE_SEND: &str = "request deadline exceeded before send";

/// Android accent color used when none is configured.
pub const DEFAULT_ANDROID_COLOR: &str = "#4CB050";

// ---------------------------------------------------------------------------
// DispatchConfig
// ---------------------------------------------------------------------------

/// Tuning and presentation settings for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum number of sends in flight at once (minimum 1).
    pub max_concurrent_sends: usize,
    /// Timeout applied to every individual provider call.
    pub send_timeout: Duration,
    /// Android notification icon URL.
    pub android_icon: Option<String>,
    /// Android notification accent color.
    pub android_color: Option<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sends: DEFAULT_MAX_CONCURRENT_SENDS,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            android_icon: Some(DEFAULT_ANDROID_ICON.to_string()),
            android_color: Some(DEFAULT_ANDROID_COLOR.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// NotificationDispatcher
// ---------------------------------------------------------------------------

/// Sends a notification to every token in a [`TokenSet`].
pub struct NotificationDispatcher {
    provider: Arc<dyn MessagingProvider>,
    classifier: Arc<dyn Classifier>,
    config: DispatchConfig,
}

impl NotificationDispatcher {
    pub fn new(
        provider: Arc<dyn MessagingProvider>,
        classifier: Arc<dyn Classifier>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            provider,
            classifier,
            config,
        }
    }

    /// Build the provider message for one token.
    ///
    /// The collapse key is only set when the request carries one; icon and
    /// color come from configuration.
    pub fn build_message(&self, request: &NotificationRequest, token: &str) -> Message {
        Message {
            token: token.to_string(),
            notification: Notification {
                title: request.title().to_string(),
                body: request.body().to_string(),
            },
            data: request.data().clone(),
            android: AndroidConfig {
                collapse_key: request.collapse_key().map(str::to_string),
                notification: AndroidNotification {
                    icon: self.config.android_icon.clone(),
                    color: self.config.android_color.clone(),
                },
            },
        }
    }

    /// Send `request` to every token and classify each result.
    ///
    /// Returns one outcome per token, in completion order. Sends still
    /// pending at `deadline` are reported as transient failures.
    ///
    /// # Errors
    ///
    /// [`CoreError::NoRegisteredTokens`] if `tokens` is empty; no send is
    /// attempted in that case.
    pub async fn dispatch(
        &self,
        request: &NotificationRequest,
        tokens: &TokenSet,
        deadline: Instant,
    ) -> Result<Vec<DeliveryOutcome>, CoreError> {
        if tokens.is_empty() {
            return Err(CoreError::NoRegisteredTokens {
                user_id: request.user_id().to_string(),
            });
        }

        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_sends.max(1)));
        let mut tasks = JoinSet::new();
        let mut in_flight = HashMap::with_capacity(tokens.len());

        for token in tokens.tokens() {
            let message = self.build_message(request, token);
            let provider = Arc::clone(&self.provider);
            let classifier = Arc::clone(&self.classifier);
            let permits = Arc::clone(&permits);
            let send_timeout = self.config.send_timeout;

            let handle = tasks.spawn(async move {
                let _permit = match timeout_at(deadline, permits.acquire_owned()).await {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_)) => {
                        return DeliveryOutcome::transient(message.token, "send pool closed")
                    }
                    Err(_) => {
                        return DeliveryOutcome::transient(message.token, DEADLINE_BEFORE_SEND)
                    }
                };
                // A permit released at the deadline can be handed over
                // before this task's own timer fires.
                if Instant::now() >= deadline {
                    return DeliveryOutcome::transient(message.token, DEADLINE_BEFORE_SEND);
                }
                send_one(
                    provider.as_ref(),
                    classifier.as_ref(),
                    message,
                    send_timeout,
                    deadline,
                )
                .await
            });
            in_flight.insert(handle.id(), token.to_string());
        }

        let mut outcomes = Vec::with_capacity(tokens.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, outcome)) => {
                    in_flight.remove(&id);
                    outcomes.push(outcome);
                }
                Err(join_err) => {
                    if let Some(token) = in_flight.remove(&join_err.id()) {
                        tracing::error!(
                            token = %redact_token(&token),
                            error = %join_err,
                            "Send task failed"
                        );
                        outcomes.push(DeliveryOutcome::transient(
                            token,
                            format!("send task failed: {join_err}"),
                        ));
                    }
                }
            }
        }

        Ok(outcomes)
    }
}

/// Perform one bounded provider call and classify the result.
async fn send_one(
    provider: &dyn MessagingProvider,
    classifier: &dyn Classifier,
    message: Message,
    send_timeout: Duration,
    deadline: Instant,
) -> DeliveryOutcome {
    let limit = (Instant::now() + send_timeout).min(deadline);

    let result = match timeout_at(limit, provider.send(&message)).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::timeout("no response from provider before timeout")),
    };

    match result {
        Ok(receipt) => {
            tracing::debug!(
                token = %redact_token(&message.token),
                message_id = %receipt.message_id,
                "Notification sent"
            );
            DeliveryOutcome::success(message.token, receipt.message_id)
        }
        Err(e) => {
            let status = match classifier.classify(&e) {
                DeliveryStatus::Success => DeliveryStatus::TransientError,
                status => status,
            };
            tracing::warn!(
                token = %redact_token(&message.token),
                ?status,
                error = %e,
                "Notification not sent"
            );
            DeliveryOutcome {
                token: message.token,
                status,
                detail: e.to_string(),
            }
        }
    }
}
