//! `PostgreSQL` implementation of the account Storage Port.

use async_trait::async_trait;
use bq_account_core::{Account, AccountId, Email, QueryFilter, RemoteId};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::instrument;

use super::{AccountStore, RepositoryError};

const ACCOUNT_COLUMNS: &str = "id, remote_id, name, email, username, phone, is_active, \
                               is_verified, created_at, updated_at, deleted_at";

/// Account row as stored in `account.accounts`.
#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: i64,
    remote_id: String,
    name: String,
    email: String,
    username: String,
    phone: String,
    is_active: bool,
    is_verified: bool,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<AccountRow> for Account {
    type Error = RepositoryError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email for account {}: {e}", row.id))
        })?;

        Ok(Self {
            id: AccountId::new(row.id),
            remote_id: RemoteId::new(row.remote_id),
            name: row.name,
            email,
            username: row.username,
            phone: row.phone,
            is_active: row.is_active,
            is_verified: row.is_verified,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

/// Account repository backed by a `PostgreSQL` pool.
#[derive(Debug, Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    /// Create a new account store.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    #[instrument(skip(self), err)]
    async fn find_all(&self, filter: &QueryFilter) -> Result<Vec<Account>, RepositoryError> {
        let mut query = find_all_query(filter);
        let rows: Vec<AccountRow> = query.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(Account::try_from).collect()
    }

    #[instrument(skip(self, account), fields(remote_id = %account.remote_id), err)]
    async fn insert(&self, account: &mut Account) -> Result<(), RepositoryError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r"
            INSERT INTO account.accounts (
                remote_id, name, email, username, phone, is_active, is_verified, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, remote_id, name, email, username, phone, is_active,
                      is_verified, created_at, updated_at, deleted_at
            ",
        )
        .bind(account.remote_id.as_str())
        .bind(&account.name)
        .bind(account.email.as_str())
        .bind(&account.username)
        .bind(&account.phone)
        .bind(account.is_active)
        .bind(account.is_verified)
        .bind(account.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_insert_error)?;

        account.id = AccountId::new(row.id);
        account.created_at = row.created_at;
        account.updated_at = row.updated_at;
        Ok(())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Build the list query for `filter`.
///
/// Text filters are case-insensitive substring matches; `search` matches
/// name, username or email.
fn find_all_query(filter: &QueryFilter) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(format!(
        "SELECT {ACCOUNT_COLUMNS} FROM account.accounts WHERE deleted_at IS NULL"
    ));

    if let Some(id) = filter.id() {
        query.push(" AND id = ").push_bind(id.as_i64());
    }
    if !filter.ids().is_empty() {
        let ids: Vec<i64> = filter.ids().iter().map(AccountId::as_i64).collect();
        query.push(" AND id = ANY(").push_bind(ids).push(")");
    }
    if let Some(name) = filter.name() {
        query.push(" AND name ILIKE ").push_bind(contains_pattern(name));
    }
    if let Some(email) = filter.email() {
        query.push(" AND email ILIKE ").push_bind(contains_pattern(email));
    }
    if let Some(phone) = filter.phone() {
        query.push(" AND phone ILIKE ").push_bind(contains_pattern(phone));
    }
    if let Some(search) = filter.search() {
        let pattern = contains_pattern(search);
        query
            .push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR username ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    query.push(" ORDER BY id DESC");

    if let Some(page) = filter.pagination() {
        query
            .push(" LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);
    }

    query
}

/// `%term%` with LIKE metacharacters escaped.
fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn map_insert_error(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return RepositoryError::Conflict(db_err.message().to_string());
        }
    }
    RepositoryError::Database(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_pattern_escapes_metacharacters() {
        assert_eq!(contains_pattern("alice"), "%alice%");
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(contains_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn test_unfiltered_query() {
        let query = find_all_query(&QueryFilter::new());
        assert_eq!(
            query.sql(),
            format!(
                "SELECT {ACCOUNT_COLUMNS} FROM account.accounts WHERE deleted_at IS NULL \
                 ORDER BY id DESC"
            )
        );
    }

    #[test]
    fn test_filters_and_pagination_are_bound() {
        let filter = QueryFilter::new()
            .with_ids([AccountId::new(2), AccountId::new(1)])
            .with_email("alice")
            .paginate(Some(2), Some(10));
        let query = find_all_query(&filter);
        let sql = query.sql();

        assert!(sql.contains("AND id = ANY($1)"));
        assert!(sql.contains("AND email ILIKE $2"));
        assert!(sql.ends_with("ORDER BY id DESC LIMIT $3 OFFSET $4"));
    }

    #[test]
    fn test_search_matches_several_columns() {
        let query = find_all_query(&QueryFilter::new().with_search("bob"));
        assert!(
            query
                .sql()
                .contains("AND (name ILIKE $1 OR username ILIKE $2 OR email ILIKE $3)")
        );
    }

    #[test]
    fn test_unpaginated_when_limit_is_zero() {
        let query = find_all_query(&QueryFilter::new().paginate(Some(4), Some(0)));
        assert!(!query.sql().contains("LIMIT"));
    }

    #[tokio::test]
    #[ignore = "Requires a PostgreSQL database (ACCOUNT_DATABASE_URL) with migrations applied"]
    #[allow(clippy::unwrap_used)]
    async fn test_insert_and_find_round_trip() {
        let url = std::env::var("ACCOUNT_DATABASE_URL").unwrap();
        let store = PgAccountStore::new(PgPool::connect(&url).await.unwrap());

        let suffix = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let email = Email::parse(&format!("it-{suffix}@example.com")).unwrap();
        let mut account = Account::pending(
            RemoteId::new(format!("idp_{suffix}")),
            "Integration Test".to_string(),
            email.clone(),
            format!("it_{suffix}"),
            String::new(),
            Utc::now(),
        );
        store.insert(&mut account).await.unwrap();
        assert!(account.id.is_assigned());

        let found = store
            .find_all(&QueryFilter::new().with_email(email.as_str()))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, account.id);

        let duplicate = store.insert(&mut account.clone()).await;
        assert!(matches!(duplicate, Err(RepositoryError::Conflict(_))));
    }
}
