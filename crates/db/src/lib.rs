//! Postgres persistence for Beacon.
//!
//! Exposes pool construction, a health probe, embedded migrations and the
//! [`PgTokenStore`] adapter for the [`TokenStore`](beacon_core::store::TokenStore)
//! seam.

use sqlx::postgres::PgPoolOptions;

pub mod repositories;

pub use repositories::PgTokenStore;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to verify the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply all pending migrations from `db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../db/migrations").run(pool).await
}
