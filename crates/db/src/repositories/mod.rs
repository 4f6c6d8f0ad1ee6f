//! Repository layer for Beacon's Postgres tables.

pub mod token_repo;

pub use token_repo::{PgTokenStore, UserTokenRepo};
