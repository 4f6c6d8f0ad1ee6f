#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderName, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use beacon_core::store::{StoreError, StoredTokens, TokenStore};
use beacon_core::types::TokenSet;
use beacon_push::provider::{DeliveryReceipt, Message, ProviderErrorCode};
use beacon_push::{
    Classifier, DispatchConfig, MessagingProvider, NotificationDispatcher, PipelineConfig,
    ProviderError, PruningPolicy, PushPipeline,
};
use http_body_util::BodyExt;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use beacon_api::config::{LogFormat, ServerConfig};
use beacon_api::routes;
use beacon_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        request_timeout_secs: 30,
        log_format: LogFormat::Text,
    }
}

pub fn tokens(names: &[&str]) -> TokenSet {
    names.iter().copied().collect()
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// In-memory token store.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<String, StoredTokens>>,
    pub down: AtomicBool,
    pub fail_updates: AtomicBool,
    updates: AtomicUsize,
}

impl MemoryStore {
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

    pub fn tokens_of(&self, user_id: &str) -> Option<TokenSet> {
        self.users
            .lock()
            .unwrap()
            .get(user_id)
            .map(|s| s.tokens.clone())
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn get(&self, user_id: &str) -> Result<StoredTokens, StoreError> {
        if self.down.load(Ordering::SeqCst) {
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
        let mut users = self.users.lock().unwrap();
        let stored = users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound(user_id.to_string()))?;
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

    async fn health_check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

/// Provider that rejects a fixed set of tokens as unregistered.
#[derive(Default)]
pub struct FakeProvider {
    unregistered: HashSet<String>,
    calls: AtomicUsize,
}

impl FakeProvider {
    pub fn rejecting(tokens: &[&str]) -> Self {
        Self {
            unregistered: tokens.iter().map(|t| t.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessagingProvider for FakeProvider {
    async fn send(&self, message: &Message) -> Result<DeliveryReceipt, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unregistered.contains(&message.token) {
            return Err(ProviderError::new(
                ProviderErrorCode::Unregistered,
                false,
                "Requested entity was not found.",
            ));
        }
        Ok(DeliveryReceipt {
            message_id: format!("projects/demo/messages/{}", message.token),
        })
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// Build the full application router with all middleware layers.
///
/// Mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack production uses.
pub fn build_test_app(store: Arc<MemoryStore>, provider: Arc<FakeProvider>) -> Router {
    let classifier: Arc<dyn Classifier> = Arc::new(PruningPolicy::Conservative);
    let dispatcher = NotificationDispatcher::new(provider, classifier, DispatchConfig::default());
    let pipeline = PushPipeline::new(store.clone(), dispatcher, PipelineConfig::default());

    let config = test_config();
    let state = AppState {
        pipeline: Arc::new(pipeline),
        store,
    };

    let request_id_header = HeaderName::from_static("x-request-id");

    Router::new()
        .merge(routes::router())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    post_raw(app, uri, body.to_string()).await
}

pub async fn post_raw(app: Router, uri: &str, body: impl Into<Body>) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Wrap an event payload the way a Pub/Sub push subscription delivers it.
pub fn envelope(payload: &serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "message": {
            "data": STANDARD.encode(payload.to_string()),
            "messageId": "2070443601311540",
            "attributes": {}
        },
        "subscription": "projects/demo/subscriptions/push"
    })
}
