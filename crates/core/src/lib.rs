//! Domain types shared across the Beacon crates: the validated request,
//! per-token outcomes, the token set, the error taxonomy and the token
//! store seam.

pub mod error;
pub mod notification;
pub mod store;
pub mod types;
pub mod validation;
