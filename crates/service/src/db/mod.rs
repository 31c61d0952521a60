//! Account storage.
//!
//! # Database
//!
//! ## Tables
//!
//! - `account.accounts` - Account records, soft-deleted via `deleted_at`
//!
//! # Migrations
//!
//! Migrations are stored in `crates/service/migrations/` and run via:
//! ```bash
//! cargo run -p bq-account-cli -- migrate
//! ```

pub mod accounts;

use std::time::Duration;

use async_trait::async_trait;
use bq_account_core::{Account, QueryFilter};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use accounts::PgAccountStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// The write was cut short before its outcome was known.
    #[error("write interrupted: {0}")]
    Interrupted(String),
}

/// Storage Port for account records.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Non-deleted accounts matching `filter`, newest identifier first.
    async fn find_all(&self, filter: &QueryFilter) -> Result<Vec<Account>, RepositoryError>;

    /// Insert `account`, writing the generated identifier and timestamps back
    /// into it on success.
    async fn insert(&self, account: &mut Account) -> Result<(), RepositoryError>;

    /// Check that the backing store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
