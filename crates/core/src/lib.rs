//! bq account core - shared domain types.
//!
//! This crate provides the types used by every part of the account service:
//! - `service` - HTTP API, caching layer and registration saga
//! - `cli` - Command-line tools for migrations
//! - `integration-tests` - Black-box tests of the HTTP contract
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Database encoding for the ID and email newtypes is
//! available behind the `postgres` feature.
//!
//! # Modules
//!
//! - [`types`] - Account record, list filter, registration request and the
//!   newtypes they are built from

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
