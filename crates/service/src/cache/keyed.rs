//! Cache keys derived from list filters.

use std::sync::Arc;
use std::time::Duration;

use bq_account_core::QueryFilter;
use sha2::{Digest, Sha256};

use super::{CacheError, CacheStore, CachedPage};

/// Namespace for cached account listings.
pub const LIST_ACCOUNTS_NAMESPACE: &str = "ListAccounts";

/// Maps [`QueryFilter`] values to cache entries.
///
/// Keys have the form `{namespace}-{sha256(canonical filter)}`.
#[derive(Clone)]
pub struct QueryCache {
    store: Arc<dyn CacheStore>,
    namespace: &'static str,
}

impl QueryCache {
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, namespace: &'static str) -> Self {
        Self { store, namespace }
    }

    /// Derive the cache key for `filter`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Serialization` if the filter cannot be serialized.
    pub fn derive_key(&self, filter: &QueryFilter) -> Result<String, CacheError> {
        let canonical = filter
            .canonical_form()
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        let digest = Sha256::digest(canonical.as_bytes());
        Ok(format!("{}-{digest:x}", self.namespace))
    }

    /// Read the entry stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns the backend error unchanged.
    pub async fn get(&self, key: &str) -> Result<Option<CachedPage>, CacheError> {
        self.store.get(key).await
    }

    /// Overwrite the entry stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns the backend error unchanged.
    pub async fn set(&self, key: &str, page: CachedPage, ttl: Duration) -> Result<(), CacheError> {
        self.store.set(key, page, ttl).await
    }

    /// Remove the entry stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns the backend error unchanged.
    pub async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.store.invalidate(key).await
    }
}
