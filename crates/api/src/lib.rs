//! Beacon push service library.
//!
//! Exposes config, state, error handling and routes so integration tests
//! and the binary entrypoint share the same building blocks.

pub mod config;
pub mod error;
pub mod response;
pub mod routes;
pub mod state;
