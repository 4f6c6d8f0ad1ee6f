//! One push invocation, end to end.
//!
//! [`PushPipeline::handle`] walks a raw event through
//! `Received -> Validated -> TokensFetched -> Dispatched -> Reconciled ->
//! Persisted -> Done`. Validation, fetch and persistence failures abort the
//! request; individual send failures never do.

use std::sync::Arc;
use std::time::Duration;

use beacon_core::error::CoreError;
use beacon_core::notification::{DeliveryStatus, NotificationRequest};
use beacon_core::store::TokenStore;
use beacon_core::validation;
use serde::Serialize;
use tokio::time::{timeout_at, Instant};

use crate::dispatcher::NotificationDispatcher;
use crate::reconciler::{
    self, TokenSetReconciler, DEFAULT_MAX_WRITE_ATTEMPTS, DEFAULT_WRITE_TIMEOUT,
};

/// Default overall deadline for one invocation.
pub const DEFAULT_REQUEST_DEADLINE: Duration = Duration::from_secs(25);

/// Request lifecycle stages, used for structured logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    TokensFetched,
    Dispatched,
    Reconciled,
    Persisted,
    Done,
    Aborted,
}

/// Pipeline-wide settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Deadline for fetching, sending and persisting, measured from receipt.
    pub request_deadline: Duration,
    /// Conditional write attempts before reporting a persistence failure.
    pub max_write_attempts: u32,
    /// Budget for the write-back that follows the fan-out. Starts when
    /// dispatch finishes, so the worst case is `request_deadline + write_timeout`.
    pub write_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            request_deadline: DEFAULT_REQUEST_DEADLINE,
            max_write_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Summary of a completed invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushReport {
    pub user_id: String,
    /// Tokens a send was attempted for.
    pub attempted: usize,
    pub delivered: usize,
    pub pruned: usize,
    /// Failed sends whose tokens were kept for a later attempt.
    pub transient: usize,
    /// Size of the token set that was persisted.
    pub remaining: usize,
}

/// Validates, dispatches and reconciles one push event.
pub struct PushPipeline {
    store: Arc<dyn TokenStore>,
    dispatcher: NotificationDispatcher,
    reconciler: TokenSetReconciler,
    request_deadline: Duration,
}

impl PushPipeline {
    pub fn new(
        store: Arc<dyn TokenStore>,
        dispatcher: NotificationDispatcher,
        config: PipelineConfig,
    ) -> Self {
        let reconciler = TokenSetReconciler::new(
            Arc::clone(&store),
            config.max_write_attempts,
            config.write_timeout,
        );
        Self {
            store,
            dispatcher,
            reconciler,
            request_deadline: config.request_deadline,
        }
    }

    /// Handle one raw event.
    pub async fn handle(&self, raw: &[u8]) -> Result<PushReport, CoreError> {
        let deadline = Instant::now() + self.request_deadline;
        tracing::debug!(stage = ?Stage::Received, bytes = raw.len(), "Push event received");

        let request = validation::validate(raw).inspect_err(|e| abort(Stage::Received, e))?;
        tracing::debug!(stage = ?Stage::Validated, user_id = request.user_id(), "Payload validated");

        self.handle_request(&request, deadline).await
    }

    /// Handle an already validated request.
    pub async fn handle_request(
        &self,
        request: &NotificationRequest,
        deadline: Instant,
    ) -> Result<PushReport, CoreError> {
        let user_id = request.user_id();

        let stored = match timeout_at(deadline, self.store.get(user_id)).await {
            Ok(result) => result.map_err(|e| e.into_fetch_error(user_id)),
            Err(_) => Err(CoreError::StoreUnavailable(
                "timed out reading token set".to_string(),
            )),
        }
        .inspect_err(|e| abort(Stage::Validated, e))?;
        tracing::debug!(
            stage = ?Stage::TokensFetched,
            user_id,
            tokens = stored.tokens.len(),
            version = stored.version,
            "Token set fetched"
        );

        let outcomes = match self
            .dispatcher
            .dispatch(request, &stored.tokens, deadline)
            .await
        {
            Ok(outcomes) => outcomes,
            Err(e) => {
                tracing::info!(
                    stage = ?Stage::Aborted,
                    from = ?Stage::TokensFetched,
                    user_id,
                    code = e.code(),
                    "Nothing to send"
                );
                return Err(e);
            }
        };
        let count = |status: DeliveryStatus| outcomes.iter().filter(|o| o.status == status).count();
        let delivered = count(DeliveryStatus::Success);
        let transient = count(DeliveryStatus::TransientError);
        tracing::debug!(
            stage = ?Stage::Dispatched,
            user_id,
            attempted = outcomes.len(),
            delivered,
            transient,
            "Dispatch complete"
        );

        let result = reconciler::reconcile(&stored.tokens, &outcomes);
        tracing::debug!(
            stage = ?Stage::Reconciled,
            user_id,
            pruned = result.pruned.len(),
            retained = result.retained.len(),
            "Token set reconciled"
        );

        let persisted = self
            .reconciler
            .persist(user_id, stored.version, &result)
            .await
            .inspect_err(|e| {
                // Sends already happened; only the bookkeeping is lost.
                tracing::error!(
                    user_id,
                    delivered,
                    error = %e,
                    "Notifications sent but token set was not persisted"
                );
                abort(Stage::Reconciled, e);
            })?;
        tracing::debug!(stage = ?Stage::Persisted, user_id, remaining = persisted.len(), "Token set persisted");

        let report = PushReport {
            user_id: user_id.to_string(),
            attempted: outcomes.len(),
            delivered,
            pruned: result.pruned.len(),
            transient,
            remaining: persisted.len(),
        };
        tracing::info!(
            stage = ?Stage::Done,
            user_id,
            attempted = report.attempted,
            delivered = report.delivered,
            pruned = report.pruned,
            transient = report.transient,
            "Push complete"
        );
        Ok(report)
    }
}

fn abort(from: Stage, error: &CoreError) {
    tracing::warn!(
        stage = ?Stage::Aborted,
        from = ?from,
        code = error.code(),
        error = %error,
        "Push aborted"
    );
}
