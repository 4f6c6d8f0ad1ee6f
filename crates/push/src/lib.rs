//! Push notification fan-out and token reconciliation.
//!
//! - [`NotificationDispatcher`]: concurrent per-token sends, each result
//!   classified into a [`DeliveryOutcome`](beacon_core::notification::DeliveryOutcome).
//! - [`reconciler`]: prunes invalid tokens and writes the survivors back.
//! - [`PushPipeline`]: one invocation from raw event to persisted token set.
//! - [`provider`] / [`fcm`] / [`auth`]: the provider seam and its FCM HTTP v1
//!   implementation with service-account authentication.
//! - [`classify`]: the provider-error pruning policy.

pub mod auth;
pub mod classify;
pub mod dispatcher;
pub mod fcm;
pub mod pipeline;
pub mod provider;
pub mod reconciler;

pub use classify::{Classifier, PruningPolicy};
pub use dispatcher::{DispatchConfig, NotificationDispatcher};
pub use fcm::{FcmClient, FcmConfig};
pub use pipeline::{PipelineConfig, PushPipeline, PushReport};
pub use provider::{DeliveryReceipt, Message, MessagingProvider, ProviderError, ProviderErrorCode};
pub use reconciler::{ReconciliationResult, TokenSetReconciler};
