//! bq account service - account listing and registration API.
//!
//! # Architecture
//!
//! - Axum web framework serving JSON
//! - `PostgreSQL` as the system of record for accounts
//! - Redis (or an in-process moka cache) in front of list queries
//! - Clerk as the external identity provider
//!
//! Migrations are NOT run on startup. Apply them with:
//! `cargo run -p bq-account-cli -- migrate`

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use bq_account_service::cache::{CacheStore, MokaCacheStore, RedisCacheStore};
use bq_account_service::config::{CacheConfig, ServiceConfig};
use bq_account_service::db::{self, PgAccountStore};
use bq_account_service::identity::ClerkIdentityProvider;
use bq_account_service::state::{AppState, Ports};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ServiceConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Pick the cache backend: Redis when configured, in-process otherwise.
async fn cache_store(config: &CacheConfig) -> Arc<dyn CacheStore> {
    match &config.redis_url {
        Some(url) => {
            let store = RedisCacheStore::connect(url)
                .await
                .expect("Failed to connect to Redis");
            tracing::info!("Using Redis list cache");
            Arc::new(store)
        }
        None => {
            tracing::info!(max_entries = config.max_entries, "Using in-process list cache");
            Arc::new(MokaCacheStore::new(config.max_entries))
        }
    }
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = ServiceConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "bq_account_service=info,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");
    tracing::info!("Database pool created");

    let identity =
        ClerkIdentityProvider::new(&config.identity).expect("Failed to create identity client");

    let ports = Ports {
        store: Arc::new(PgAccountStore::new(pool)),
        cache: cache_store(&config.cache).await,
        identity: Arc::new(identity),
    };
    let state = AppState::new(ports, &config.cache, config.identity.compensation_timeout);
    let populator = state.populator().clone();

    let app = bq_account_service::app(state);

    let addr = config.socket_addr();
    tracing::info!("account service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // Finish cache writes accepted before shutdown
    populator.shutdown().await;
    tracing::info!("Shutdown complete");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
