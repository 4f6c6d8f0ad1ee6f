//! Mapping of provider errors onto per-token delivery statuses.
//!
//! Only errors that say something about the token itself may lead to
//! pruning. Timeouts, quota errors and outages carry no information about
//! token validity and always classify as [`DeliveryStatus::TransientError`].

use std::str::FromStr;

use beacon_core::notification::DeliveryStatus;

use crate::provider::{ProviderError, ProviderErrorCode};

/// Decides whether a failed send invalidates the token.
pub trait Classifier: Send + Sync {
    /// Classify a send error. Must never return [`DeliveryStatus::Success`].
    fn classify(&self, error: &ProviderError) -> DeliveryStatus;
}

/// Built-in pruning policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PruningPolicy {
    /// Prune only tokens the provider explicitly reports as unregistered or
    /// bound to another sender.
    #[default]
    Conservative,
    /// Additionally prune tokens whose message was rejected as an invalid
    /// argument.
    Aggressive,
}

impl Classifier for PruningPolicy {
    fn classify(&self, error: &ProviderError) -> DeliveryStatus {
        let invalidates = match (&error.code, self) {
            (ProviderErrorCode::Unregistered | ProviderErrorCode::SenderIdMismatch, _) => true,
            (ProviderErrorCode::InvalidArgument, PruningPolicy::Aggressive) => !error.retryable,
            _ => false,
        };

        if invalidates {
            DeliveryStatus::InvalidToken
        } else {
            DeliveryStatus::TransientError
        }
    }
}

/// Error returned when parsing an unknown policy name.
#[derive(Debug, thiserror::Error)]
#[error("Unknown pruning policy '{0}' (expected 'conservative' or 'aggressive')")]
pub struct UnknownPolicy(String);

impl FromStr for PruningPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" => Ok(Self::Conservative),
            "aggressive" => Ok(Self::Aggressive),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}
