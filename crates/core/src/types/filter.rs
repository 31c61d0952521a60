//! List-query filter for accounts.
//!
//! A [`QueryFilter`] is both the storage query and the input of the cache key,
//! so two filters that are field-for-field equal must serialize to the same
//! bytes no matter how they were built. That is guaranteed by construction:
//! fields are private, text inputs are trimmed (blank means "no filter"), the
//! identifier set is a `BTreeSet`, and pagination is normalized on the way in.

use std::collections::BTreeSet;

use serde::Serialize;

use super::id::AccountId;

/// Page size used when the caller asks for a negative limit.
pub const DEFAULT_LIMIT: i64 = 10;

/// Page used when the caller asks for page zero or a negative page.
pub const FIRST_PAGE: i64 = 1;

/// Limit/offset pair derived from a filter's page and limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Maximum number of rows to return.
    pub limit: i64,
    /// Number of rows to skip.
    pub offset: i64,
}

/// Parameters of a list-accounts query.
///
/// ```
/// use bq_account_core::QueryFilter;
///
/// let a = QueryFilter::new().with_email("alice").paginate(Some(2), Some(10));
/// let b = QueryFilter::new().paginate(Some(2), Some(10)).with_email(" alice ");
/// assert_eq!(a, b);
/// assert_eq!(a.pagination().map(|p| p.offset), Some(10));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryFilter {
    id: Option<AccountId>,
    ids: BTreeSet<AccountId>,
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    search: Option<String>,
    page: i64,
    limit: i64,
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self {
            id: None,
            ids: BTreeSet::new(),
            name: None,
            email: None,
            phone: None,
            search: None,
            page: FIRST_PAGE,
            limit: 0,
        }
    }
}

impl QueryFilter {
    /// An unfiltered, unpaginated query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact match on a single identifier.
    #[must_use]
    pub const fn with_id(mut self, id: AccountId) -> Self {
        self.id = Some(id);
        self
    }

    /// Restrict to a set of identifiers. Duplicates and order are ignored.
    #[must_use]
    pub fn with_ids(mut self, ids: impl IntoIterator<Item = AccountId>) -> Self {
        self.ids.extend(ids);
        self
    }

    /// Case-insensitive substring match on the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl AsRef<str>) -> Self {
        self.name = normalize_term(name.as_ref());
        self
    }

    /// Case-insensitive substring match on the email address.
    #[must_use]
    pub fn with_email(mut self, email: impl AsRef<str>) -> Self {
        self.email = normalize_term(email.as_ref());
        self
    }

    /// Case-insensitive substring match on the phone number.
    #[must_use]
    pub fn with_phone(mut self, phone: impl AsRef<str>) -> Self {
        self.phone = normalize_term(phone.as_ref());
        self
    }

    /// Case-insensitive substring match on name, username or email.
    #[must_use]
    pub fn with_search(mut self, search: impl AsRef<str>) -> Self {
        self.search = normalize_term(search.as_ref());
        self
    }

    /// Set pagination, normalizing out-of-range values.
    ///
    /// A missing, zero or negative page becomes [`FIRST_PAGE`]. A negative
    /// limit becomes [`DEFAULT_LIMIT`]; a missing limit also defaults to it.
    /// A limit of zero means "unpaginated".
    #[must_use]
    pub fn paginate(mut self, page: Option<i64>, limit: Option<i64>) -> Self {
        self.page = match page {
            Some(p) if p >= FIRST_PAGE => p,
            _ => FIRST_PAGE,
        };
        self.limit = match limit {
            Some(l) if l >= 0 => l,
            _ => DEFAULT_LIMIT,
        };
        self
    }

    /// Exact identifier filter, if any.
    #[must_use]
    pub const fn id(&self) -> Option<AccountId> {
        self.id
    }

    /// Identifier set filter (empty means no filter), in ascending order.
    #[must_use]
    pub const fn ids(&self) -> &BTreeSet<AccountId> {
        &self.ids
    }

    /// Name substring filter.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Email substring filter.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Phone substring filter.
    #[must_use]
    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    /// Free-text search filter.
    #[must_use]
    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    /// Normalized page number (always >= 1).
    #[must_use]
    pub const fn page(&self) -> i64 {
        self.page
    }

    /// Normalized page size (0 = unpaginated).
    #[must_use]
    pub const fn limit(&self) -> i64 {
        self.limit
    }

    /// `LIMIT`/`OFFSET` to apply, or `None` when the query is unpaginated.
    #[must_use]
    pub const fn pagination(&self) -> Option<Pagination> {
        if self.page == 0 || self.limit == 0 {
            return None;
        }
        Some(Pagination {
            limit: self.limit,
            offset: (self.page - 1).saturating_mul(self.limit),
        })
    }

    /// Stable serialized form used to derive cache keys.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; in practice this cannot fail for the
    /// plain field types used here.
    pub fn canonical_form(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn normalize_term(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}
