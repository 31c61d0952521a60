//! Shared Cache Port backed by Redis.
//!
//! Each entry occupies two keys: the payload under `key` and the count under
//! `cnt-{key}`. Both are written in one `MULTI` block with the same expiry
//! and read back with one `MGET`, so a reader sees either both halves or a
//! miss.

use std::time::Duration;

use ::redis::Client;
use ::redis::aio::ConnectionManager;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::instrument;

use super::{CacheError, CacheStore, CachedPage};

const COUNT_KEY_PREFIX: &str = "cnt-";

/// Redis cache using a reconnecting connection manager.
#[derive(Clone)]
pub struct RedisCacheStore {
    conn: ConnectionManager,
}

impl RedisCacheStore {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Backend` if the URL is invalid or the initial
    /// connection fails.
    pub async fn connect(url: &SecretString) -> Result<Self, CacheError> {
        let client = Client::open(url.expose_secret())?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

fn count_key(key: &str) -> String {
    format!("{COUNT_KEY_PREFIX}{key}")
}

/// Redis rejects `EX 0`; round sub-second TTLs up to one second.
fn expiry_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<CachedPage>, CacheError> {
        let mut conn = self.conn.clone();
        let (payload, count): (Option<Vec<u8>>, Option<i64>) = ::redis::cmd("MGET")
            .arg(key)
            .arg(count_key(key))
            .query_async(&mut conn)
            .await?;

        Ok(match (payload, count) {
            (Some(payload), Some(count)) => Some(CachedPage { payload, count }),
            _ => None,
        })
    }

    #[instrument(skip(self, page), fields(bytes = page.payload.len()))]
    async fn set(&self, key: &str, page: CachedPage, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let secs = expiry_secs(ttl);
        ::redis::pipe()
            .atomic()
            .set_ex(key, page.payload, secs)
            .ignore()
            .set_ex(count_key(key), page.count, secs)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        ::redis::cmd("DEL")
            .arg(key)
            .arg(count_key(key))
            .query_async::<i64>(&mut conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_count_key_prefix() {
        assert_eq!(count_key("ListAccounts-abc"), "cnt-ListAccounts-abc");
    }

    #[test]
    fn test_expiry_secs_never_zero() {
        assert_eq!(expiry_secs(Duration::from_millis(10)), 1);
        assert_eq!(expiry_secs(Duration::from_secs(60)), 60);
    }

    #[tokio::test]
    #[ignore = "Requires a Redis server (REDIS_URL)"]
    async fn test_redis_round_trip() {
        let url = SecretString::from(std::env::var("REDIS_URL").unwrap());
        let store = RedisCacheStore::connect(&url).await.unwrap();
        let page = CachedPage {
            payload: b"[]".to_vec(),
            count: 0,
        };

        store
            .set("test-round-trip", page.clone(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(store.get("test-round-trip").await.unwrap(), Some(page));

        store.invalidate("test-round-trip").await.unwrap();
        assert_eq!(store.get("test-round-trip").await.unwrap(), None);
    }
}
