pub mod health;
pub mod push;

use axum::Router;

use crate::state::AppState;

/// Build the route tree.
///
/// ```text
/// GET  /health    service and token store health
/// POST /push      Pub/Sub push subscription endpoint
/// ```
pub fn router() -> Router<AppState> {
    Router::new().merge(health::router()).merge(push::router())
}
