//! Business logic on top of the Ports.
//!
//! - [`listing`] - read-through account listing
//! - [`provisioning`] - registration saga

pub mod listing;
pub mod provisioning;

pub use listing::{AccountListService, AccountPage};
pub use provisioning::{
    AccountProvisioningSaga, CompensationError, CompensationOutcome, ProvisioningError,
};
