/// How the transport should treat the inbound message after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Acknowledge: nothing further can be done for this message.
    Ack,
    /// The message itself is bad; redelivering it cannot succeed.
    DeadLetter,
    /// A dependency failed; redelivery may succeed.
    Retry,
}

/// Request-level failures of a push invocation.
///
/// Per-token delivery failures never appear here; they are recorded as
/// [`DeliveryOutcome`](crate::notification::DeliveryOutcome)s instead.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Missing required field: {0}")]
    MissingRequiredField(&'static str),

    #[error("User {user_id} has no registered tokens")]
    NoRegisteredTokens { user_id: String },

    #[error("User {user_id} not found")]
    UserNotFound { user_id: String },

    #[error("Stored tokens for user {user_id} do not match the expected schema: {detail}")]
    SchemaMismatch { user_id: String, detail: String },

    #[error("Token store unavailable: {0}")]
    StoreUnavailable(String),

    /// Writing the reconciled token set failed after notifications were sent.
    #[error("Failed to persist tokens for user {user_id}: {detail}")]
    PersistenceError { user_id: String, detail: String },
}

impl CoreError {
    pub fn disposition(&self) -> Disposition {
        match self {
            CoreError::NoRegisteredTokens { .. } | CoreError::UserNotFound { .. } => {
                Disposition::Ack
            }
            CoreError::MalformedPayload(_)
            | CoreError::MissingRequiredField(_)
            | CoreError::SchemaMismatch { .. } => Disposition::DeadLetter,
            CoreError::StoreUnavailable(_) | CoreError::PersistenceError { .. } => {
                Disposition::Retry
            }
        }
    }

    /// Stable machine-readable code used in error responses.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            CoreError::MissingRequiredField(_) => "MISSING_REQUIRED_FIELD",
            CoreError::NoRegisteredTokens { .. } => "NO_REGISTERED_TOKENS",
            CoreError::UserNotFound { .. } => "USER_NOT_FOUND",
            CoreError::SchemaMismatch { .. } => "SCHEMA_MISMATCH",
            CoreError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            CoreError::PersistenceError { .. } => "PERSISTENCE_ERROR",
        }
    }
}
