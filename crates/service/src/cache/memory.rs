//! In-process Cache Port backed by `moka`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;

use super::{CacheError, CacheStore, CachedPage};

#[derive(Debug)]
struct TimedPage {
    page: CachedPage,
    ttl: Duration,
}

/// Expires each entry after the TTL it was written with.
struct PerEntryTtl;

impl Expiry<String, Arc<TimedPage>> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Arc<TimedPage>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Arc<TimedPage>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process cache. Payload and count live in a single entry.
#[derive(Clone)]
pub struct MokaCacheStore {
    cache: Cache<String, Arc<TimedPage>>,
}

impl MokaCacheStore {
    /// Create a cache holding at most `max_entries` list results.
    #[must_use]
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }
}

#[async_trait]
impl CacheStore for MokaCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CachedPage>, CacheError> {
        Ok(self.cache.get(key).await.map(|entry| entry.page.clone()))
    }

    async fn set(&self, key: &str, page: CachedPage, ttl: Duration) -> Result<(), CacheError> {
        self.cache
            .insert(key.to_owned(), Arc::new(TimedPage { page, ttl }))
            .await;
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(key).await;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn page(count: i64) -> CachedPage {
        CachedPage {
            payload: b"[]".to_vec(),
            count,
        }
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = MokaCacheStore::new(100);
        store
            .set("k", page(3), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(page(3)));
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let store = MokaCacheStore::new(100);
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let store = MokaCacheStore::new(100);
        store
            .set("k", page(1), Duration::from_millis(50))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value_and_ttl() {
        let store = MokaCacheStore::new(100);
        store
            .set("k", page(1), Duration::from_millis(50))
            .await
            .unwrap();
        store
            .set("k", page(2), Duration::from_secs(60))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.get("k").await.unwrap(), Some(page(2)));
    }

    #[tokio::test]
    async fn test_invalidate_missing_key_is_ok() {
        let store = MokaCacheStore::new(100);
        store.invalidate("missing").await.unwrap();
        store.set("k", page(1), Duration::from_secs(60)).await.unwrap();
        store.invalidate("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
