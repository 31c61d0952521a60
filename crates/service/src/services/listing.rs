//! Cache-first account listing.
//!
//! A hit is served straight from the cache. A miss reads storage, returns the
//! rows and hands a copy to the [`CachePopulator`]; the response never waits
//! for that write. Cache failures of any kind are logged and treated as a
//! miss, and a storage failure leaves the cache untouched.

use std::sync::Arc;
use std::time::Duration;

use bq_account_core::{Account, QueryFilter};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::cache::{CachePopulator, CachedPage, PopulateJob, QueryCache};
use crate::db::{AccountStore, RepositoryError};

/// One page of accounts plus its item count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountPage {
    #[serde(rename = "data")]
    pub accounts: Vec<Account>,
    pub count: i64,
}

/// Read-through list service for accounts.
#[derive(Clone)]
pub struct AccountListService {
    store: Arc<dyn AccountStore>,
    cache: QueryCache,
    populator: CachePopulator,
    ttl: Duration,
}

impl AccountListService {
    /// `ttl` is applied to every entry this service writes.
    #[must_use]
    pub fn new(
        store: Arc<dyn AccountStore>,
        cache: QueryCache,
        populator: CachePopulator,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            populator,
            ttl,
        }
    }

    /// List accounts matching `filter`, cache first.
    ///
    /// # Errors
    ///
    /// Returns the storage error on a cache miss whose storage read fails.
    #[instrument(skip(self))]
    pub async fn list(&self, filter: &QueryFilter) -> Result<AccountPage, RepositoryError> {
        let key = match self.cache.derive_key(filter) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, "Failed to derive cache key, bypassing cache");
                None
            }
        };

        if let Some(key) = &key {
            if let Some(page) = self.cached(key).await {
                return Ok(page);
            }
        }

        let accounts = self.store.find_all(filter).await?;
        let count = i64::try_from(accounts.len()).unwrap_or(i64::MAX);

        if let Some(key) = key {
            self.schedule_population(key, &accounts, count);
        }

        Ok(AccountPage { accounts, count })
    }

    /// Read storage directly, bypassing the cache in both directions.
    ///
    /// Used where a stale answer is not acceptable, such as the uniqueness
    /// check during registration.
    ///
    /// # Errors
    ///
    /// Returns the storage error.
    #[instrument(skip(self))]
    pub async fn lookup(&self, filter: &QueryFilter) -> Result<Vec<Account>, RepositoryError> {
        self.store.find_all(filter).await
    }

    /// Drop the cached entry for `filter`, if any. Failures are logged.
    pub async fn invalidate(&self, filter: &QueryFilter) {
        let key = match self.cache.derive_key(filter) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "Failed to derive cache key for invalidation");
                return;
            }
        };
        if let Err(e) = self.cache.invalidate(&key).await {
            warn!(key = %key, error = %e, "Failed to invalidate cache entry");
        }
    }

    async fn cached(&self, key: &str) -> Option<AccountPage> {
        let page = match self.cache.get(key).await {
            Ok(Some(page)) => page,
            Ok(None) => {
                debug!(key, "Cache miss");
                return None;
            }
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, falling back to storage");
                return None;
            }
        };

        match serde_json::from_slice::<Vec<Account>>(&page.payload) {
            Ok(accounts) => {
                debug!(key, count = page.count, "Cache hit");
                Some(AccountPage {
                    accounts,
                    count: page.count,
                })
            }
            Err(e) => {
                warn!(key, error = %e, "Cached payload unreadable, treating as miss");
                None
            }
        }
    }

    fn schedule_population(&self, key: String, accounts: &[Account], count: i64) {
        let payload = match serde_json::to_vec(accounts) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize accounts for cache");
                return;
            }
        };

        self.populator.schedule(PopulateJob {
            key,
            page: CachedPage { payload, count },
            ttl: self.ttl,
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bq_account_core::{Email, RemoteId};
    use chrono::Utc;

    use super::*;
    use crate::cache::{CacheStore, LIST_ACCOUNTS_NAMESPACE, MokaCacheStore};
    use crate::test_support::{FailingCacheStore, FakeAccountStore};

    struct Harness {
        store: Arc<FakeAccountStore>,
        cache: QueryCache,
        populator: CachePopulator,
        service: AccountListService,
    }

    fn harness_with(cache_store: Arc<dyn CacheStore>, ttl: Duration) -> Harness {
        let store = Arc::new(FakeAccountStore::new());
        let cache = QueryCache::new(cache_store, LIST_ACCOUNTS_NAMESPACE);
        let populator = CachePopulator::spawn(cache.clone(), 2, 16);
        let service = AccountListService::new(
            Arc::clone(&store) as Arc<dyn AccountStore>,
            cache.clone(),
            populator.clone(),
            ttl,
        );
        Harness {
            store,
            cache,
            populator,
            service,
        }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(MokaCacheStore::new(100)), Duration::from_secs(60))
    }

    fn seed(store: &FakeAccountStore, name: &str, email: &str) -> Account {
        store.seed(Account::pending(
            RemoteId::new(format!("idp_{name}")),
            name.to_string(),
            Email::parse(email).unwrap(),
            name.to_lowercase(),
            String::new(),
            Utc::now(),
        ))
    }

    #[tokio::test]
    async fn test_cold_cache_reads_storage_and_populates() {
        let h = harness();
        seed(&h.store, "Alice", "alice@example.com");
        seed(&h.store, "Bob", "bob@example.com");
        let filter = QueryFilter::new().with_email("alice");

        let page = h.service.list(&filter).await.unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.accounts[0].name, "Alice");
        assert_eq!(h.store.find_calls(), 1);

        h.populator.wait_idle().await;
        let key = h.cache.derive_key(&filter).unwrap();
        let cached = h.cache.get(&key).await.unwrap().unwrap();
        assert_eq!(cached.count, 1);
    }

    #[tokio::test]
    async fn test_warm_cache_skips_storage() {
        let h = harness();
        seed(&h.store, "Alice", "alice@example.com");
        let filter = QueryFilter::new().with_email("alice");

        let first = h.service.list(&filter).await.unwrap();
        h.populator.wait_idle().await;
        let second = h.service.list(&filter).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(h.store.find_calls(), 1);
    }

    #[tokio::test]
    async fn test_count_matches_result_length() {
        let h = harness();
        for i in 0..5 {
            seed(&h.store, &format!("User{i}"), &format!("user{i}@example.com"));
        }
        let page = h
            .service
            .list(&QueryFilter::new().paginate(Some(1), Some(2)))
            .await
            .unwrap();
        assert_eq!(page.accounts.len(), 2);
        assert_eq!(page.count, 2);
    }

    #[tokio::test]
    async fn test_storage_error_propagates_and_leaves_cache_untouched() {
        let h = harness();
        h.store.fail_find(true);
        let filter = QueryFilter::new();

        assert!(h.service.list(&filter).await.is_err());
        h.populator.wait_idle().await;

        let key = h.cache.derive_key(&filter).unwrap();
        assert_eq!(h.cache.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cache_failures_fall_back_to_storage() {
        let h = harness_with(Arc::new(FailingCacheStore), Duration::from_secs(60));
        seed(&h.store, "Alice", "alice@example.com");

        let page = h.service.list(&QueryFilter::new()).await.unwrap();
        h.populator.wait_idle().await;
        let again = h.service.list(&QueryFilter::new()).await.unwrap();

        assert_eq!(page, again);
        assert_eq!(h.store.find_calls(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_a_miss() {
        let h = harness();
        seed(&h.store, "Alice", "alice@example.com");
        let filter = QueryFilter::new();
        let key = h.cache.derive_key(&filter).unwrap();
        h.cache
            .set(
                &key,
                CachedPage {
                    payload: b"not json".to_vec(),
                    count: 7,
                },
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        let page = h.service.list(&filter).await.unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(h.store.find_calls(), 1);
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let h = harness_with(Arc::new(MokaCacheStore::new(100)), Duration::from_millis(50));
        seed(&h.store, "Alice", "alice@example.com");
        let filter = QueryFilter::new();

        h.service.list(&filter).await.unwrap();
        h.populator.wait_idle().await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        h.service.list(&filter).await.unwrap();

        assert_eq!(h.store.find_calls(), 2);
    }

    #[tokio::test]
    async fn test_lookup_bypasses_cache() {
        let h = harness();
        seed(&h.store, "Alice", "alice@example.com");
        let filter = QueryFilter::new().with_email("alice@example.com");

        h.service.lookup(&filter).await.unwrap();
        h.service.lookup(&filter).await.unwrap();
        h.populator.wait_idle().await;

        assert_eq!(h.store.find_calls(), 2);
        let key = h.cache.derive_key(&filter).unwrap();
        assert_eq!(h.cache.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalidate_forces_storage_read() {
        let h = harness();
        seed(&h.store, "Alice", "alice@example.com");
        let filter = QueryFilter::new();

        h.service.list(&filter).await.unwrap();
        h.populator.wait_idle().await;
        h.service.invalidate(&filter).await;
        h.service.list(&filter).await.unwrap();

        assert_eq!(h.store.find_calls(), 2);
    }
}
