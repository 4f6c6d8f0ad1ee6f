//! Shared fakes for the push integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use beacon_core::store::{StoreError, StoredTokens, TokenStore};
use beacon_core::types::TokenSet;
use beacon_push::classify::Classifier;
use beacon_push::dispatcher::{DispatchConfig, NotificationDispatcher};
use beacon_push::pipeline::{PipelineConfig, PushPipeline};
use beacon_push::provider::{
    DeliveryReceipt, Message, MessagingProvider, ProviderError, ProviderErrorCode,
};
use beacon_push::PruningPolicy;

pub fn tokens(names: &[&str]) -> TokenSet {
    names.iter().copied().collect()
}

// ---------------------------------------------------------------------------
// FakeProvider
// ---------------------------------------------------------------------------

/// Scripted response for one token.
#[derive(Clone)]
pub enum Reply {
    Ok,
    Fail(ProviderError),
    /// Never answers.
    Hang,
    Panic,
}

pub fn unregistered() -> Reply {
    Reply::Fail(ProviderError::new(
        ProviderErrorCode::Unregistered,
        false,
        "Requested entity was not found.",
    ))
}

pub fn unavailable() -> Reply {
    Reply::Fail(ProviderError::new(
        ProviderErrorCode::Unavailable,
        true,
        "The service is currently unavailable.",
    ))
}

pub fn invalid_argument() -> Reply {
    Reply::Fail(ProviderError::new(
        ProviderErrorCode::InvalidArgument,
        false,
        "The registration token is not a valid FCM registration token",
    ))
}

/// Provider that answers from a per-token script (default: success) and
/// records every message and the peak number of concurrent calls.
#[derive(Default)]
pub struct FakeProvider {
    replies: HashMap<String, Reply>,
    delay: Duration,
    sent: Mutex<Vec<Message>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, token: &str, reply: Reply) -> Self {
        self.replies.insert(token.to_string(), reply);
        self
    }

    /// Make every call take `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessagingProvider for FakeProvider {
    async fn send(&self, message: &Message) -> Result<DeliveryReceipt, ProviderError> {
        self.sent.lock().unwrap().push(message.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let reply = self
            .replies
            .get(&message.token)
            .cloned()
            .unwrap_or(Reply::Ok);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match reply {
            Reply::Ok => Ok(DeliveryReceipt {
                message_id: format!("projects/demo/messages/{}", message.token),
            }),
            Reply::Fail(e) => Err(e),
            Reply::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Reply::Panic => panic!("provider blew up for {}", message.token),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory [`TokenStore`] with failure injection.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<String, StoredTokens>>,
    updates: AtomicUsize,
    fail_gets: AtomicBool,
    fail_updates: AtomicBool,
    /// Updates never complete.
    hang_updates: AtomicBool,
    /// Applied as a competing write right before the next update.
    concurrent_write: Mutex<Option<TokenSet>>,
    /// Competing write applied before every update.
    always_conflict: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, user_id: &str, tokens: TokenSet) -> Self {
        self.users.lock().unwrap().insert(
            user_id.to_string(),
            StoredTokens {
                tokens,
                version: 0,
                updated_at: None,
            },
        );
        self
    }

    pub fn failing_gets(self) -> Self {
        self.fail_gets.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_updates(self) -> Self {
        self.fail_updates.store(true, Ordering::SeqCst);
        self
    }

    pub fn hanging_updates(self) -> Self {
        self.hang_updates.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_concurrent_write(self, tokens: TokenSet) -> Self {
        *self.concurrent_write.lock().unwrap() = Some(tokens);
        self
    }

    pub fn always_conflicting(self) -> Self {
        self.always_conflict.store(true, Ordering::SeqCst);
        self
    }

    pub fn tokens_of(&self, user_id: &str) -> Option<TokenSet> {
        self.users
            .lock()
            .unwrap()
            .get(user_id)
            .map(|s| s.tokens.clone())
    }

    pub fn version_of(&self, user_id: &str) -> Option<i64> {
        self.users.lock().unwrap().get(user_id).map(|s| s.version)
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn get(&self, user_id: &str) -> Result<StoredTokens, StoreError> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        self.users
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(user_id.to_string()))
    }

    async fn update(
        &self,
        user_id: &str,
        tokens: &TokenSet,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write timed out".into()));
        }
        if self.hang_updates.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let mut users = self.users.lock().unwrap();
        let stored = users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound(user_id.to_string()))?;

        let competing = self.concurrent_write.lock().unwrap().take();
        if let Some(competing) = competing {
            stored.tokens = competing;
            stored.version += 1;
        } else if self.always_conflict.load(Ordering::SeqCst) {
            stored.version += 1;
        }

        if stored.version != expected_version {
            return Err(StoreError::Conflict {
                user_id: user_id.to_string(),
                expected_version,
            });
        }
        stored.tokens = tokens.clone();
        stored.version += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn dispatcher(
    provider: Arc<FakeProvider>,
    policy: PruningPolicy,
    config: DispatchConfig,
) -> NotificationDispatcher {
    let classifier: Arc<dyn Classifier> = Arc::new(policy);
    NotificationDispatcher::new(provider, classifier, config)
}

pub fn pipeline(store: Arc<MemoryStore>, provider: Arc<FakeProvider>) -> PushPipeline {
    pipeline_with(store, provider, PruningPolicy::Conservative)
}

pub fn pipeline_with(
    store: Arc<MemoryStore>,
    provider: Arc<FakeProvider>,
    policy: PruningPolicy,
) -> PushPipeline {
    pipeline_with_config(store, provider, policy, PipelineConfig::default())
}

pub fn pipeline_with_config(
    store: Arc<MemoryStore>,
    provider: Arc<FakeProvider>,
    policy: PruningPolicy,
    config: PipelineConfig,
) -> PushPipeline {
    PushPipeline::new(
        store,
        dispatcher(provider, policy, DispatchConfig::default()),
        config,
    )
}
