//! The account record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::email::Email;
use super::id::{AccountId, RemoteId};

/// A persisted user account.
///
/// Every account is linked to exactly one identity at the external provider
/// through [`Account::remote_id`]. Listings only ever return accounts whose
/// `deleted_at` is unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Storage-assigned identifier ([`AccountId::UNASSIGNED`] before insert).
    pub id: AccountId,
    /// Identity-provider reference.
    pub remote_id: RemoteId,
    /// Display name.
    pub name: String,
    /// Email address, unique among non-deleted accounts.
    pub email: Email,
    /// Login handle.
    pub username: String,
    /// Phone number; empty when not provided.
    pub phone: String,
    /// Whether the account may sign in.
    pub is_active: bool,
    /// Whether the contact details were verified.
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Soft-delete marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Build a fresh, active, unverified account that storage has not seen yet.
    #[must_use]
    pub fn pending(
        remote_id: RemoteId,
        name: String,
        email: Email,
        username: String,
        phone: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AccountId::UNASSIGNED,
            remote_id,
            name,
            email,
            username,
            phone,
            is_active: true,
            is_verified: false,
            created_at,
            updated_at: None,
            deleted_at: None,
        }
    }

    /// Whether the account has been soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
