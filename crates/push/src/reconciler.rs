//! Applying delivery outcomes to the stored token set.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use beacon_core::error::CoreError;
use beacon_core::notification::{DeliveryOutcome, DeliveryStatus};
use beacon_core::store::{StoreError, TokenStore};
use beacon_core::types::{redact_token, TokenSet};

/// Default number of conditional write attempts before giving up.
pub const DEFAULT_MAX_WRITE_ATTEMPTS: u32 = 3;

/// Default budget for the whole write-back, retries included.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(4);

/// The token set to persist, plus what happened to the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationResult {
    /// Tokens to write back.
    pub retained: TokenSet,
    /// Tokens removed because the provider reported them invalid.
    pub pruned: BTreeSet<String>,
    /// Tokens that had no outcome at all. Retained.
    pub unattempted: BTreeSet<String>,
}

/// Compute the surviving token set.
///
/// Removes every token whose outcome is [`DeliveryStatus::InvalidToken`] and
/// keeps everything else. The result does not depend on the order of
/// `outcomes`; outcomes for tokens outside `original` are ignored.
pub fn reconcile(original: &TokenSet, outcomes: &[DeliveryOutcome]) -> ReconciliationResult {
    let mut by_token: HashMap<&str, DeliveryStatus> = HashMap::with_capacity(outcomes.len());
    for outcome in outcomes {
        // A token seen twice is pruned if any of its outcomes says so.
        let status = by_token
            .entry(outcome.token.as_str())
            .or_insert(outcome.status);
        if outcome.status == DeliveryStatus::InvalidToken {
            *status = outcome.status;
        }
    }

    let mut retained = original.clone();
    let mut pruned = BTreeSet::new();
    let mut unattempted = BTreeSet::new();

    for token in original.tokens() {
        match by_token.get(token) {
            Some(DeliveryStatus::InvalidToken) => {
                pruned.insert(token.to_string());
            }
            Some(_) => {}
            None => {
                unattempted.insert(token.to_string());
            }
        }
    }
    for token in &pruned {
        retained.remove(token);
    }

    if !unattempted.is_empty() {
        tracing::error!(
            count = unattempted.len(),
            "Tokens without a delivery outcome, retaining them"
        );
    }

    ReconciliationResult {
        retained,
        pruned,
        unattempted,
    }
}

// ---------------------------------------------------------------------------
// TokenSetReconciler
// ---------------------------------------------------------------------------

/// Writes reconciled token sets back to the [`TokenStore`].
pub struct TokenSetReconciler {
    store: Arc<dyn TokenStore>,
    max_write_attempts: u32,
    write_timeout: Duration,
}

impl TokenSetReconciler {
    pub fn new(
        store: Arc<dyn TokenStore>,
        max_write_attempts: u32,
        write_timeout: Duration,
    ) -> Self {
        Self {
            store,
            max_write_attempts: max_write_attempts.max(1),
            write_timeout,
        }
    }

    /// Persist `result.retained` for `user_id`, read at `stored_version`.
    ///
    /// The write happens even when nothing was pruned. If another writer
    /// changed the set in between, the current set is re-read, the same
    /// pruned tokens are removed from it, and the write is retried; tokens
    /// added concurrently survive.
    ///
    /// Returns the token set that was finally written.
    ///
    /// # Errors
    ///
    /// [`CoreError::PersistenceError`] if the store fails, the version
    /// keeps moving for `max_write_attempts` attempts, or the store reads
    /// and writes together take longer than `write_timeout`.
    pub async fn persist(
        &self,
        user_id: &str,
        stored_version: i64,
        result: &ReconciliationResult,
    ) -> Result<TokenSet, CoreError> {
        match tokio::time::timeout(
            self.write_timeout,
            self.write_back(user_id, stored_version, result),
        )
        .await
        {
            Ok(written) => written,
            Err(_) => Err(CoreError::PersistenceError {
                user_id: user_id.to_string(),
                detail: format!("write-back timed out after {:?}", self.write_timeout),
            }),
        }
    }

    async fn write_back(
        &self,
        user_id: &str,
        stored_version: i64,
        result: &ReconciliationResult,
    ) -> Result<TokenSet, CoreError> {
        let persistence_error = |detail: String| CoreError::PersistenceError {
            user_id: user_id.to_string(),
            detail,
        };

        let mut tokens = result.retained.clone();
        let mut version = stored_version;

        for attempt in 1..=self.max_write_attempts {
            match self.store.update(user_id, &tokens, version).await {
                Ok(()) => return Ok(tokens),
                Err(StoreError::Conflict { .. }) if attempt < self.max_write_attempts => {
                    tracing::info!(
                        user_id,
                        attempt,
                        version,
                        "Token set changed concurrently, re-reading"
                    );
                    let current = self
                        .store
                        .get(user_id)
                        .await
                        .map_err(|e| persistence_error(e.to_string()))?;
                    tokens = current.tokens;
                    for token in &result.pruned {
                        if tokens.remove(token).is_some() {
                            tracing::debug!(token = %redact_token(token), "Pruning token");
                        }
                    }
                    version = current.version;
                }
                Err(e) => return Err(persistence_error(e.to_string())),
            }
        }

        Err(persistence_error(format!(
            "token set kept changing after {} attempts",
            self.max_write_attempts
        )))
    }
}
