//! Integration tests for the account service HTTP API.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p bq-account-integration-tests
//! ```
//!
//! Each test starts the real router on an ephemeral local port, backed by the
//! in-memory storage and identity fakes plus the in-process cache, and talks
//! to it over HTTP with `reqwest`. No external services are needed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bq_account_service::cache::MokaCacheStore;
use bq_account_service::config::CacheConfig;
use bq_account_service::db::AccountStore;
use bq_account_service::identity::IdentityProvider;
use bq_account_service::state::{AppState, Ports};
use bq_account_service::test_support::{FakeAccountStore, FakeIdentityProvider};
use reqwest::Client;

/// Compensation budget used by every test server.
pub const COMPENSATION_TIMEOUT: Duration = Duration::from_secs(3);

/// A running account service with handles to its fakes.
pub struct TestContext {
    pub client: Client,
    pub base_url: String,
    pub store: Arc<FakeAccountStore>,
    pub identity: Arc<FakeIdentityProvider>,
    pub state: AppState,
}

impl TestContext {
    /// Start a server with empty fakes.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn new() -> Self {
        Self::with_fakes(FakeAccountStore::new(), FakeIdentityProvider::new()).await
    }

    /// Start a server over the given fakes.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn with_fakes(store: FakeAccountStore, identity: FakeIdentityProvider) -> Self {
        let store = Arc::new(store);
        let identity = Arc::new(identity);
        let cache = CacheConfig::default();

        let state = AppState::new(
            Ports {
                store: Arc::clone(&store) as Arc<dyn AccountStore>,
                cache: Arc::new(MokaCacheStore::new(cache.max_entries)),
                identity: Arc::clone(&identity) as Arc<dyn IdentityProvider>,
            },
            &cache,
            COMPENSATION_TIMEOUT,
        );

        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Failed to read local address");

        let app = bq_account_service::app(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Test server error");
        });

        Self {
            client: Client::new(),
            base_url: format!("http://{addr}"),
            store,
            identity,
            state,
        }
    }

    /// Absolute URL for `path`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Wait until every scheduled cache write has landed.
    pub async fn settle_cache(&self) {
        self.state.populator().wait_idle().await;
    }
}
