use std::sync::Arc;

use beacon_core::store::TokenStore;
use beacon_push::PushPipeline;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything lives behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Validates, fans out and reconciles one push event.
    pub pipeline: Arc<PushPipeline>,
    /// Token store, probed by the health check.
    pub store: Arc<dyn TokenStore>,
}
