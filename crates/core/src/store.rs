//! Token store seam.
//!
//! The push pipeline reads and writes a user's [`TokenSet`] only through
//! [`TokenStore`], so the backing document store can be swapped (Postgres
//! in production, in-memory fakes in tests).

use async_trait::async_trait;

use crate::error::CoreError;
use crate::types::{Timestamp, TokenSet};

/// A user's token set together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTokens {
    pub tokens: TokenSet,
    /// Monotonic write counter used for conditional updates.
    pub version: i64,
    pub updated_at: Option<Timestamp>,
}

/// Error type for token store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("User {0} not found")]
    NotFound(String),

    /// The stored value could not be decoded into a [`TokenSet`].
    #[error("Stored token set has an unexpected shape: {0}")]
    SchemaMismatch(String),

    /// A conditional write lost against a concurrent writer.
    #[error("Token set for user {user_id} changed since version {expected_version}")]
    Conflict {
        user_id: String,
        expected_version: i64,
    },

    #[error("Token store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Map a failed read into the request-level taxonomy.
    pub fn into_fetch_error(self, user_id: &str) -> CoreError {
        match self {
            StoreError::NotFound(_) => CoreError::UserNotFound {
                user_id: user_id.to_string(),
            },
            StoreError::SchemaMismatch(detail) => CoreError::SchemaMismatch {
                user_id: user_id.to_string(),
                detail,
            },
            other => CoreError::StoreUnavailable(other.to_string()),
        }
    }
}

/// Read/write access to per-user token sets.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Fetch the current token set for `user_id`.
    ///
    /// A user that exists but has never registered a token yields an empty
    /// set, not [`StoreError::NotFound`].
    async fn get(&self, user_id: &str) -> Result<StoredTokens, StoreError>;

    /// Replace the token set for `user_id` if it is still at
    /// `expected_version`.
    ///
    /// Returns [`StoreError::Conflict`] when another writer got there first.
    async fn update(
        &self,
        user_id: &str,
        tokens: &TokenSet,
        expected_version: i64,
    ) -> Result<(), StoreError>;

    /// Cheap reachability probe used by the health endpoint.
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
