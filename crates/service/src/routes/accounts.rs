//! Account route handlers.

use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
};
use bq_account_core::{Account, AccountId, QueryFilter, RegisterAccount};
use serde::Deserialize;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::services::AccountPage;
use crate::state::AppState;

/// Query parameters for account listing.
///
/// Everything arrives as text so that a malformed `page` or `limit` falls
/// back to the default instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub id: Option<String>,
    /// Comma separated account ids.
    pub ids: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub search: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl ListParams {
    /// Build the list filter.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if `id` or any entry of `ids` is not an integer.
    pub fn into_filter(self) -> Result<QueryFilter> {
        let mut filter = QueryFilter::new();

        if let Some(id) = non_blank(self.id.as_deref()) {
            filter = filter.with_id(parse_id(id)?);
        }
        if let Some(ids) = non_blank(self.ids.as_deref()) {
            let ids = ids
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(parse_id)
                .collect::<Result<Vec<_>>>()?;
            filter = filter.with_ids(ids);
        }
        if let Some(name) = self.name {
            filter = filter.with_name(name);
        }
        if let Some(email) = self.email {
            filter = filter.with_email(email);
        }
        if let Some(phone) = self.phone {
            filter = filter.with_phone(phone);
        }
        if let Some(search) = self.search {
            filter = filter.with_search(search);
        }

        Ok(filter.paginate(lenient_int(self.page), lenient_int(self.limit)))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_id(value: &str) -> Result<AccountId> {
    value
        .parse::<i64>()
        .map(AccountId::new)
        .map_err(|_| AppError::BadRequest(format!("invalid account id: {value}")))
}

fn lenient_int(value: Option<String>) -> Option<i64> {
    value.and_then(|v| v.trim().parse().ok())
}

/// List accounts.
#[instrument(skip(state))]
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<AccountPage>> {
    let filter = params.into_filter()?;
    let page = state.accounts().list(&filter).await?;
    Ok(Json(page))
}

/// Register a new account.
#[instrument(skip(state, body))]
pub async fn register(
    State(state): State<AppState>,
    body: std::result::Result<Json<RegisterAccount>, JsonRejection>,
) -> Result<Json<Account>> {
    let Json(request) = body.map_err(|rejection| match rejection {
        JsonRejection::JsonDataError(e) => AppError::Validation(e.body_text()),
        other => AppError::BadRequest(other.body_text()),
    })?;

    let account = state.provisioning().register(request).await?;
    Ok(Json(account))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // Goes through the same deserialization as the `Query` extractor.
    fn params(pairs: &[(&str, &str)]) -> ListParams {
        let query = pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let uri: axum::http::Uri = format!("/accounts?{query}").parse().unwrap();
        Query::<ListParams>::try_from_uri(&uri).unwrap().0
    }

    #[test]
    fn test_missing_pagination_uses_defaults() {
        let filter = params(&[]).into_filter().unwrap();
        assert_eq!(filter.page(), 1);
        assert_eq!(filter.limit(), 10);
    }

    #[test]
    fn test_invalid_pagination_falls_back() {
        let filter = params(&[("page", "abc"), ("limit", "-5")])
            .into_filter()
            .unwrap();
        assert_eq!(filter.page(), 1);
        assert_eq!(filter.limit(), 10);
    }

    #[test]
    fn test_zero_page_normalizes_to_first() {
        let filter = params(&[("page", "0"), ("limit", "3")])
            .into_filter()
            .unwrap();
        assert_eq!(filter.page(), 1);
        assert_eq!(filter.limit(), 3);
    }

    #[test]
    fn test_ids_are_comma_separated() {
        let filter = params(&[("ids", "3,1,,2,")]).into_filter().unwrap();
        let ids: Vec<i64> = filter.ids().iter().map(AccountId::as_i64).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_invalid_id_is_bad_request() {
        let err = params(&[("id", "abc")]).into_filter().unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err = params(&[("ids", "1,x")]).into_filter().unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_text_filters_are_applied() {
        let filter = params(&[("email", "alice"), ("search", "smi")])
            .into_filter()
            .unwrap();
        assert_eq!(filter.email(), Some("alice"));
        assert_eq!(filter.search(), Some("smi"));
        assert_eq!(filter.name(), None);
    }
}
