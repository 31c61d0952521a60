//! Core types for the account service.
//!
//! This module provides the account record and the values used to query and
//! create it.

pub mod account;
pub mod email;
pub mod filter;
pub mod id;
pub mod registration;
pub mod username;

pub use account::Account;
pub use email::{Email, EmailError};
pub use filter::{DEFAULT_LIMIT, FIRST_PAGE, Pagination, QueryFilter};
pub use id::{AccountId, RemoteId};
pub use registration::RegisterAccount;
pub use username::{FALLBACK_USERNAME, split_display_name, username_from_email};
