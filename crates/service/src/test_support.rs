//! In-memory Port fakes for tests.
//!
//! Available to this crate's unit tests and, with the `test-support` feature,
//! to other workspace crates.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bq_account_core::{Account, AccountId, QueryFilter, RemoteId};

use crate::cache::{CacheError, CacheStore, CachedPage};
use crate::db::{AccountStore, RepositoryError};
use crate::identity::{IdentityError, IdentityProvider, NewIdentity};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Storage
// =============================================================================

/// Account store holding records in memory.
///
/// Filtering mirrors the SQL implementation: case-insensitive substring
/// matches, soft-deleted rows hidden, newest id first.
#[derive(Debug)]
pub struct FakeAccountStore {
    accounts: Mutex<Vec<Account>>,
    next_id: AtomicI64,
    find_calls: AtomicUsize,
    insert_calls: AtomicUsize,
    fail_find: AtomicBool,
    fail_insert: AtomicBool,
    unavailable: AtomicBool,
    insert_delay: Mutex<Option<Duration>>,
}

impl Default for FakeAccountStore {
    fn default() -> Self {
        Self {
            accounts: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
            find_calls: AtomicUsize::new(0),
            insert_calls: AtomicUsize::new(0),
            fail_find: AtomicBool::new(false),
            fail_insert: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
            insert_delay: Mutex::new(None),
        }
    }
}

impl FakeAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier the next insert will assign.
    #[must_use]
    pub fn with_next_id(self, id: i64) -> Self {
        self.next_id.store(id, Ordering::SeqCst);
        self
    }

    /// Store `account` as-is, assigning an id when it has none.
    pub fn seed(&self, mut account: Account) -> Account {
        if !account.id.is_assigned() {
            account.id = AccountId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        }
        lock(&self.accounts).push(account.clone());
        account
    }

    /// Make every `find_all` fail with a database error.
    pub fn fail_find(&self, fail: bool) {
        self.fail_find.store(fail, Ordering::SeqCst);
    }

    /// Make every `insert` fail with a unique-constraint conflict.
    pub fn fail_insert(&self, fail: bool) {
        self.fail_insert.store(fail, Ordering::SeqCst);
    }

    /// Make `insert` take this long before answering.
    pub fn delay_insert(&self, delay: Duration) {
        *lock(&self.insert_delay) = Some(delay);
    }

    /// Make `ping` fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    #[must_use]
    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    /// Snapshot of every stored account.
    #[must_use]
    pub fn accounts(&self) -> Vec<Account> {
        lock(&self.accounts).clone()
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn matches_filter(account: &Account, filter: &QueryFilter) -> bool {
    if account.is_deleted() {
        return false;
    }
    if filter.id().is_some_and(|id| id != account.id) {
        return false;
    }
    if !filter.ids().is_empty() && !filter.ids().contains(&account.id) {
        return false;
    }
    if filter.name().is_some_and(|n| !contains_ci(&account.name, n)) {
        return false;
    }
    if filter
        .email()
        .is_some_and(|e| !contains_ci(account.email.as_str(), e))
    {
        return false;
    }
    if filter.phone().is_some_and(|p| !contains_ci(&account.phone, p)) {
        return false;
    }
    if let Some(term) = filter.search() {
        return contains_ci(&account.name, term)
            || contains_ci(&account.username, term)
            || contains_ci(account.email.as_str(), term);
    }
    true
}

#[async_trait]
impl AccountStore for FakeAccountStore {
    async fn find_all(&self, filter: &QueryFilter) -> Result<Vec<Account>, RepositoryError> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_find.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }

        let mut found: Vec<Account> = lock(&self.accounts)
            .iter()
            .filter(|account| matches_filter(account, filter))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.id.cmp(&a.id));

        if let Some(page) = filter.pagination() {
            let offset = usize::try_from(page.offset).unwrap_or(usize::MAX);
            let limit = usize::try_from(page.limit).unwrap_or(usize::MAX);
            found = found.into_iter().skip(offset).take(limit).collect();
        }
        Ok(found)
    }

    async fn insert(&self, account: &mut Account) -> Result<(), RepositoryError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *lock(&self.insert_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(RepositoryError::Conflict(
                "duplicate key value violates unique constraint \"accounts_email_key\"".to_string(),
            ));
        }

        let mut accounts = lock(&self.accounts);
        let duplicate = accounts.iter().any(|existing| {
            !existing.is_deleted()
                && (existing.email.matches(account.email.as_str())
                    || existing.username == account.username)
        });
        if duplicate {
            return Err(RepositoryError::Conflict(
                "duplicate key value violates unique constraint".to_string(),
            ));
        }

        account.id = AccountId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        accounts.push(account.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

// =============================================================================
// Identity provider
// =============================================================================

/// Identity provider that records calls instead of making them.
#[derive(Debug, Default)]
pub struct FakeIdentityProvider {
    scripted_ids: Mutex<VecDeque<String>>,
    created: Mutex<Vec<NewIdentity>>,
    deleted: Mutex<Vec<(RemoteId, Duration)>>,
    create_counter: AtomicUsize,
    completed_deletes: AtomicUsize,
    fail_create: AtomicBool,
    fail_delete: AtomicBool,
    delete_delay: Mutex<Option<Duration>>,
}

impl FakeIdentityProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue ids for upcoming `create_identity` calls. Once the queue is
    /// empty, ids are generated as `idp_<n>`.
    #[must_use]
    pub fn with_ids<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.scripted_ids).extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    /// Make `delete_identity` take this long before answering.
    pub fn delay_delete(&self, delay: Duration) {
        *lock(&self.delete_delay) = Some(delay);
    }

    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.create_counter.load(Ordering::SeqCst)
    }

    /// Identities passed to `create_identity`, in call order.
    #[must_use]
    pub fn created(&self) -> Vec<NewIdentity> {
        lock(&self.created).clone()
    }

    /// Deletes that ran to completion and succeeded.
    #[must_use]
    pub fn completed_deletes(&self) -> usize {
        self.completed_deletes.load(Ordering::SeqCst)
    }

    /// `(remote id, timeout)` pairs passed to `delete_identity`, in call order.
    #[must_use]
    pub fn deleted(&self) -> Vec<(RemoteId, Duration)> {
        lock(&self.deleted).clone()
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn create_identity(&self, identity: &NewIdentity) -> Result<RemoteId, IdentityError> {
        let n = self.create_counter.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.created).push(identity.clone());
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(IdentityError::Api {
                status: 422,
                message: "That email address is taken.".to_string(),
            });
        }

        let id = lock(&self.scripted_ids)
            .pop_front()
            .unwrap_or_else(|| format!("idp_{n}"));
        Ok(RemoteId::new(id))
    }

    async fn delete_identity(
        &self,
        remote_id: &RemoteId,
        timeout: Duration,
    ) -> Result<(), IdentityError> {
        lock(&self.deleted).push((remote_id.clone(), timeout));

        let delay = *lock(&self.delete_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(IdentityError::Api {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        self.completed_deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Cache
// =============================================================================

/// Cache whose every operation fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingCacheStore;

#[async_trait]
impl CacheStore for FailingCacheStore {
    async fn get(&self, _key: &str) -> Result<Option<CachedPage>, CacheError> {
        Err(CacheError::Backend("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _page: CachedPage, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Backend("connection refused".to_string()))
    }

    async fn invalidate(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Backend("connection refused".to_string()))
    }
}
