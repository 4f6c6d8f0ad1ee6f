use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use beacon_core::error::{CoreError, Disposition};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for push failures.
/// The status code tells the push transport what to do with the message:
/// 2xx acknowledges it, 4xx marks it undeliverable, 5xx asks for redelivery.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A request-level failure from the push pipeline.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => {
                let status = match core {
                    CoreError::MalformedPayload(_) | CoreError::MissingRequiredField(_) => {
                        StatusCode::BAD_REQUEST
                    }
                    // Nothing to do; acknowledged so the message is not redelivered.
                    CoreError::NoRegisteredTokens { .. } | CoreError::UserNotFound { .. } => {
                        StatusCode::OK
                    }
                    CoreError::SchemaMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    CoreError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                    CoreError::PersistenceError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                };
                match core.disposition() {
                    Disposition::Retry => tracing::error!(error = %core, "Push failed, requesting redelivery"),
                    Disposition::DeadLetter => tracing::warn!(error = %core, "Push rejected"),
                    Disposition::Ack => {}
                }
                (status, core.code(), core.to_string())
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
