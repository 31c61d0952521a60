//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CachePopulator, CacheStore, LIST_ACCOUNTS_NAMESPACE, QueryCache};
use crate::config::CacheConfig;
use crate::db::AccountStore;
use crate::identity::IdentityProvider;
use crate::services::{AccountListService, AccountProvisioningSaga};

/// The external systems the service talks to.
pub struct Ports {
    pub store: Arc<dyn AccountStore>,
    pub cache: Arc<dyn CacheStore>,
    pub identity: Arc<dyn IdentityProvider>,
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Arc<dyn AccountStore>,
    accounts: AccountListService,
    provisioning: AccountProvisioningSaga,
    populator: CachePopulator,
}

impl AppState {
    /// Wire the services on top of `ports`.
    ///
    /// Spawns the cache populator, so this must be called inside a Tokio
    /// runtime.
    #[must_use]
    pub fn new(ports: Ports, cache: &CacheConfig, compensation_timeout: Duration) -> Self {
        let Ports {
            store,
            cache: cache_store,
            identity,
        } = ports;

        let query_cache = QueryCache::new(cache_store, LIST_ACCOUNTS_NAMESPACE);
        let populator = CachePopulator::spawn(
            query_cache.clone(),
            cache.populate_workers,
            cache.populate_queue,
        );
        let accounts = AccountListService::new(
            Arc::clone(&store),
            query_cache,
            populator.clone(),
            cache.ttl_short,
        );
        let provisioning = AccountProvisioningSaga::new(
            accounts.clone(),
            Arc::clone(&store),
            identity,
            compensation_timeout,
        );

        Self {
            inner: Arc::new(AppStateInner {
                store,
                accounts,
                provisioning,
                populator,
            }),
        }
    }

    /// Cache-first account listing.
    #[must_use]
    pub fn accounts(&self) -> &AccountListService {
        &self.inner.accounts
    }

    /// Registration saga.
    #[must_use]
    pub fn provisioning(&self) -> &AccountProvisioningSaga {
        &self.inner.provisioning
    }

    /// Account storage, for readiness checks.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn AccountStore> {
        &self.inner.store
    }

    /// Background cache writer.
    #[must_use]
    pub fn populator(&self) -> &CachePopulator {
        &self.inner.populator
    }
}
