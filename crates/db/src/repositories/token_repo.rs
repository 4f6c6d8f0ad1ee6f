//! Repository for the `users.fcm_tokens` column.

use async_trait::async_trait;
use beacon_core::store::{StoreError, StoredTokens, TokenStore};
use beacon_core::types::{Timestamp, TokenSet};
use sqlx::types::Json;
use sqlx::PgPool;

/// Provides read and conditional-write access to a user's push tokens.
pub struct UserTokenRepo;

impl UserTokenRepo {
    /// Insert a user row, optionally with an initial token set.
    ///
    /// `None` leaves `fcm_tokens` NULL, i.e. a user who never registered a
    /// device.
    pub async fn create_user(
        pool: &PgPool,
        user_id: &str,
        tokens: Option<&TokenSet>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO users (id, fcm_tokens) VALUES ($1, $2)")
            .bind(user_id)
            .bind(tokens.map(Json))
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Fetch the raw token column, its version and last update time.
    ///
    /// Returns `None` when the user row does not exist.
    pub async fn find(
        pool: &PgPool,
        user_id: &str,
    ) -> Result<Option<(Option<serde_json::Value>, i64, Option<Timestamp>)>, sqlx::Error> {
        sqlx::query_as(
            "SELECT fcm_tokens, fcm_tokens_version, updated_at \
             FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Replace the token set if the row is still at `expected_version`,
    /// bumping the version.
    ///
    /// Returns `true` if the row was updated, `false` if the version moved on
    /// (or the row disappeared).
    pub async fn update_if_version(
        pool: &PgPool,
        user_id: &str,
        tokens: &TokenSet,
        expected_version: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users \
             SET fcm_tokens = $2, \
                 fcm_tokens_version = fcm_tokens_version + 1, \
                 updated_at = NOW() \
             WHERE id = $1 AND fcm_tokens_version = $3",
        )
        .bind(user_id)
        .bind(Json(tokens))
        .bind(expected_version)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

/// [`TokenStore`] backed by the `users` table.
#[derive(Clone)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn unavailable(err: sqlx::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn get(&self, user_id: &str) -> Result<StoredTokens, StoreError> {
        let (raw, version, updated_at) = UserTokenRepo::find(&self.pool, user_id)
            .await
            .map_err(unavailable)?
            .ok_or_else(|| StoreError::NotFound(user_id.to_string()))?;

        let tokens = match raw {
            None | Some(serde_json::Value::Null) => TokenSet::new(),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| StoreError::SchemaMismatch(e.to_string()))?,
        };

        Ok(StoredTokens {
            tokens,
            version,
            updated_at,
        })
    }

    async fn update(
        &self,
        user_id: &str,
        tokens: &TokenSet,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        let updated =
            UserTokenRepo::update_if_version(&self.pool, user_id, tokens, expected_version)
                .await
                .map_err(unavailable)?;

        if !updated {
            tracing::debug!(user_id, expected_version, "Token set version moved on");
            return Err(StoreError::Conflict {
                user_id: user_id.to_string(),
                expected_version,
            });
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool).await.map_err(unavailable)
    }
}
