use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderName, StatusCode};
use axum::Router;
use beacon_core::store::TokenStore;
use beacon_push::auth::{ServiceAccountKey, ServiceAccountTokenSource, StaticTokenSource, TokenSource};
use beacon_push::{
    Classifier, FcmClient, FcmConfig, MessagingProvider, NotificationDispatcher, PushPipeline,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use beacon_api::config::{DatabaseConfig, FcmCredentials, LogFormat, PushConfig, ServerConfig};
use beacon_api::routes;
use beacon_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = ServerConfig::from_env().expect("Invalid server configuration");
    let db_config = DatabaseConfig::from_env().expect("Invalid database configuration");
    let push_config = PushConfig::from_env().expect("Invalid push configuration");
    push_config
        .check_request_timeout(&config)
        .expect("Push timeouts do not fit the HTTP request timeout");

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "beacon_api=debug,beacon_push=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let pool = beacon_db::create_pool(&db_config.url, db_config.max_connections)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    beacon_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    beacon_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let store: Arc<dyn TokenStore> = Arc::new(beacon_db::PgTokenStore::new(pool));

    // --- FCM ---
    let (token_source, key_project_id): (Arc<dyn TokenSource>, Option<String>) =
        match &push_config.fcm.credentials {
            FcmCredentials::Static(token) => {
                tracing::warn!("Using static FCM access token");
                (Arc::new(StaticTokenSource::new(token.clone())), None)
            }
            FcmCredentials::ServiceAccount(path) => {
                let key = ServiceAccountKey::from_file(path)
                    .expect("Failed to load service account key");
                tracing::info!(client_email = %key.client_email, "Loaded service account key");
                let project_id = key.project_id.clone();
                let source = ServiceAccountTokenSource::new(key)
                    .expect("Service account key cannot sign tokens");
                (Arc::new(source), project_id)
            }
        };

    let project_id = push_config
        .fcm
        .project_id
        .clone()
        .or(key_project_id)
        .expect("FCM_PROJECT_ID must be set when the service account key has no project_id");

    let fcm_config = FcmConfig {
        project_id,
        endpoint: push_config.fcm.endpoint.clone(),
        request_timeout: push_config.dispatch.send_timeout,
    };
    tracing::info!(
        project_id = %fcm_config.project_id,
        endpoint = %fcm_config.endpoint,
        policy = ?push_config.policy,
        max_concurrent_sends = push_config.dispatch.max_concurrent_sends,
        "FCM provider configured"
    );
    let provider: Arc<dyn MessagingProvider> =
        Arc::new(FcmClient::new(fcm_config, token_source).expect("Failed to build FCM client"));

    // --- Pipeline ---
    let classifier: Arc<dyn Classifier> = Arc::new(push_config.policy);
    let dispatcher = NotificationDispatcher::new(provider, classifier, push_config.dispatch);
    let pipeline = Arc::new(PushPipeline::new(
        Arc::clone(&store),
        dispatcher,
        push_config.pipeline,
    ));

    // --- App state ---
    let state = AppState {
        pipeline,
        store,
    };

    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        .merge(routes::router())
        // -- Middleware stack (applied bottom-up) --
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
        .with_state(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM.
///
/// In-flight requests finish before the server exits, so a push that has
/// already fanned out still gets its token set written back.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
