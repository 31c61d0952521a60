//! List-result caching.
//!
//! - [`CacheStore`] - the Cache Port, implemented by [`MokaCacheStore`]
//!   (in-process) and [`RedisCacheStore`] (shared)
//! - [`QueryCache`] - derives keys from a [`QueryFilter`](bq_account_core::QueryFilter)
//!   and reads/writes (payload, count) pairs
//! - [`CachePopulator`] - bounded background writer used after cache misses
//!
//! The cache is a disposable projection of storage. Every error in this
//! module is logged by its caller and otherwise ignored.

pub mod keyed;
pub mod memory;
pub mod populator;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use keyed::{LIST_ACCOUNTS_NAMESPACE, QueryCache};
pub use memory::MokaCacheStore;
pub use populator::{CachePopulator, PopulateJob};
pub use redis::RedisCacheStore;

/// Errors raised by cache backends.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend could not be reached or rejected the command.
    #[error("cache backend error: {0}")]
    Backend(String),

    /// A value could not be encoded or decoded.
    #[error("cache serialization error: {0}")]
    Serialization(String),
}

impl From<::redis::RedisError> for CacheError {
    fn from(err: ::redis::RedisError) -> Self {
        Self::Backend(err.to_string())
    }
}

/// A cached list result: the serialized accounts and their count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPage {
    pub payload: Vec<u8>,
    pub count: i64,
}

/// Cache Port: key-value storage with TTL expiry.
///
/// Implementations must store payload and count together so that a read
/// never returns one without the other.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read an entry. Missing or expired entries are `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<CachedPage>, CacheError>;

    /// Write an entry, replacing any previous value.
    async fn set(&self, key: &str, page: CachedPage, ttl: Duration) -> Result<(), CacheError>;

    /// Remove an entry. Removing a missing key succeeds.
    async fn invalidate(&self, key: &str) -> Result<(), CacheError>;
}
